use std::{any::Any, fmt, ptr};

/// Дескриптор типа полезной нагрузки.
///
/// Дескрипторы образуют цепочку одиночного наследования: у каждого типа,
/// кроме корневого, есть родитель. Топик объявляет тип, и в него можно
/// публиковать объекты этого типа или любого его потомка (ковариантность).
///
/// Дескрипторы задаются как `static`, а сравниваются по адресу, поэтому два
/// разных дескриптора с одинаковым именем считаются разными типами.
///
/// ```
/// use topicbus::pubsub::{PayloadType, FLOAT};
///
/// static CELSIUS: PayloadType = PayloadType::derived("Celsius", &FLOAT);
///
/// assert!(CELSIUS.is_descendant_of(&FLOAT));
/// assert!(!FLOAT.is_descendant_of(&CELSIUS));
/// ```
pub struct PayloadType {
    name: &'static str,
    parent: Option<&'static PayloadType>,
}

/// Корень иерархии: топик типа `OBJECT` принимает любую нагрузку.
pub static OBJECT: PayloadType = PayloadType::root("Object");
/// Числа с плавающей точкой (`f32`, `f64`).
pub static FLOAT: PayloadType = PayloadType::derived("Float", &OBJECT);
/// Целые числа всех ширин.
pub static INTEGER: PayloadType = PayloadType::derived("Integer", &OBJECT);
/// Строки (`String`, `&'static str`).
pub static STRING: PayloadType = PayloadType::derived("String", &OBJECT);
/// Логические значения.
pub static BOOLEAN: PayloadType = PayloadType::derived("Boolean", &OBJECT);
/// Сырые байты (`Vec<u8>`).
pub static BYTES: PayloadType = PayloadType::derived("Bytes", &OBJECT);

/// Объект, который можно опубликовать в топик.
///
/// Обычно реализуется макросом [`impl_payload!`](crate::impl_payload).
/// Опубликованный объект неизменяем и разделяется всеми подписчиками,
/// поэтому требуется `Send + Sync`. Деструктор нагрузки выполнится в потоке
/// того подписчика, который отпустит сообщение последним.
pub trait Payload: Any + Send + Sync {
    /// Дескриптор конкретного (самого производного) типа объекта.
    fn payload_type(&self) -> &'static PayloadType;

    /// Для downcast к конкретному типу при чтении.
    fn as_any(&self) -> &dyn Any;
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl PayloadType {
    /// Корневой тип без родителя.
    pub const fn root(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    /// Тип-потомок `parent`.
    pub const fn derived(
        name: &'static str,
        parent: &'static PayloadType,
    ) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn parent(&self) -> Option<&'static PayloadType> {
        self.parent
    }

    /// `true`, если `self` совпадает с `ancestor` или является его потомком.
    pub fn is_descendant_of(
        &self,
        ancestor: &PayloadType,
    ) -> bool {
        let mut current = Some(self);
        while let Some(ty) = current {
            if ptr::eq(ty, ancestor) {
                return true;
            }
            current = ty.parent;
        }
        false
    }

    /// Глубина в иерархии: у корня 0.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent;
        while let Some(ty) = current {
            depth += 1;
            current = ty.parent;
        }
        depth
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl PartialEq for PayloadType {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        ptr::eq(self, other)
    }
}

impl Eq for PayloadType {}

impl fmt::Debug for PayloadType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self.parent {
            Some(parent) => write!(f, "PayloadType({} : {})", self.name, parent.name),
            None => write!(f, "PayloadType({})", self.name),
        }
    }
}

impl fmt::Display for PayloadType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Реализует [`Payload`] для типа, привязывая его к статическому дескриптору.
///
/// ```
/// use topicbus::{impl_payload, pubsub::{PayloadType, OBJECT}};
///
/// static READING: PayloadType = PayloadType::derived("Reading", &OBJECT);
///
/// struct Reading {
///     value: f64,
/// }
///
/// impl_payload!(Reading => READING);
/// ```
#[macro_export]
macro_rules! impl_payload {
    ($ty:ty => $desc:path) => {
        impl $crate::pubsub::Payload for $ty {
            fn payload_type(&self) -> &'static $crate::pubsub::PayloadType {
                &$desc
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }
    };
    ($($ty:ty),+ => $desc:path) => {
        $( $crate::impl_payload!($ty => $desc); )+
    };
}

impl_payload!(f32, f64 => FLOAT);
impl_payload!(i8, i16, i32, i64, i128, isize => INTEGER);
impl_payload!(u8, u16, u32, u64, u128, usize => INTEGER);
impl_payload!(String, &'static str => STRING);
impl_payload!(bool => BOOLEAN);
impl_payload!(Vec<u8> => BYTES);

#[cfg(test)]
mod tests {
    use super::*;

    static CELSIUS: PayloadType = PayloadType::derived("Celsius", &FLOAT);

    struct Celsius(f64);

    impl_payload!(Celsius => CELSIUS);

    /// Тест проверяет, что тип является потомком самого себя и всех предков.
    #[test]
    fn test_descendant_chain() {
        assert!(CELSIUS.is_descendant_of(&CELSIUS));
        assert!(CELSIUS.is_descendant_of(&FLOAT));
        assert!(CELSIUS.is_descendant_of(&OBJECT));
        assert!(!FLOAT.is_descendant_of(&CELSIUS));
        assert!(!CELSIUS.is_descendant_of(&STRING));
        assert_eq!(CELSIUS.depth(), 2);
        assert_eq!(OBJECT.depth(), 0);
    }

    /// Тест проверяет, что дескрипторы сравниваются по адресу, а не по имени.
    #[test]
    fn test_identity_by_address() {
        static FAKE_FLOAT: PayloadType = PayloadType::derived("Float", &OBJECT);
        assert_eq!(FLOAT.name(), FAKE_FLOAT.name());
        assert_ne!(FLOAT, FAKE_FLOAT);
        assert!(!FAKE_FLOAT.is_descendant_of(&FLOAT));
    }

    #[test]
    fn test_builtin_payload_types() {
        assert_eq!(42.5f64.payload_type(), &FLOAT);
        assert_eq!(7u8.payload_type(), &INTEGER);
        assert_eq!(String::from("x").payload_type(), &STRING);
        assert_eq!("x".payload_type(), &STRING);
        assert_eq!(true.payload_type(), &BOOLEAN);
        assert_eq!(vec![1u8, 2].payload_type(), &BYTES);
    }

    #[test]
    fn test_custom_payload_downcast() {
        let value: Box<dyn Payload> = Box::new(Celsius(21.5));
        assert_eq!(value.payload_type().name(), "Celsius");
        let back = value.as_any().downcast_ref::<Celsius>().map(|c| c.0);
        assert_eq!(back, Some(21.5));
        assert!(value.as_any().downcast_ref::<f64>().is_none());
    }

    #[test]
    fn test_debug_and_display() {
        assert_eq!(format!("{CELSIUS:?}"), "PayloadType(Celsius : Float)");
        assert_eq!(CELSIUS.to_string(), "Celsius");
    }
}
