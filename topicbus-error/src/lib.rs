pub mod ext;
pub mod macros;
pub mod stack;
pub mod status_code;
pub mod types;

// Публичный экспорт всех типов ошибок и функций из вложенных
// модулей, чтобы упростить доступ к ним из внешнего кода.
pub use ext::*;
pub use macros::*;
pub use stack::*;
pub use status_code::*;
pub use types::*;

/// Результат операций инфраструктурного уровня (конфигурация, логирование).
pub type BusResult<T> = Result<T, StackError>;

/// Результат операций ядра pub/sub.
pub type PubSubResult<T> = Result<T, PubSubError>;
