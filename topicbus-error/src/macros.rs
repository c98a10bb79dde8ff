/// Возвращает из функции `Err(StackError)`.
///
/// `bail!(err)` принимает любую ошибку с [`ErrorExt`](crate::ErrorExt),
/// `bail!(code, "fmt", args..)` собирает [`GenericError`](crate::GenericError).
///
/// ```
/// use topicbus_error::{bail, BusResult, StatusCode};
///
/// fn capacity(raw: usize) -> BusResult<usize> {
///     if raw == 0 {
///         bail!(StatusCode::InvalidConfig, "capacity must be positive");
///     }
///     Ok(raw)
/// }
///
/// assert!(capacity(0).is_err());
/// ```
#[macro_export]
macro_rules! bail {
    ($code:expr, $($fmt:tt)+) => {
        return ::std::result::Result::Err($crate::StackError::new(
            $crate::GenericError::new($code, format!($($fmt)+)),
        ))
    };
    ($err:expr $(,)?) => {
        return ::std::result::Result::Err($crate::StackError::from($err))
    };
}

/// `bail!`, если условие ложно. Аргументы после условия те же, что у
/// `bail!`.
///
/// ```
/// use topicbus_error::{ensure, BusResult, StatusCode};
///
/// fn limit(raw: usize) -> BusResult<usize> {
///     ensure!(raw <= 65_536, StatusCode::InvalidConfig, "limit too large: {}", raw);
///     Ok(raw)
/// }
///
/// assert!(limit(1 << 20).is_err());
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($rest:tt)+) => {
        if !($cond) {
            $crate::bail!($($rest)+);
        }
    };
}

/// Пояснения к ошибкам в `Result`: ошибка превращается в
/// [`StackError`](crate::StackError) и получает новый кадр.
pub trait ResultExt<T> {
    fn context<C: Into<String>>(
        self,
        note: C,
    ) -> Result<T, crate::StackError>;

    /// Текст пояснения строится только при ошибке.
    fn with_context<C, F>(
        self,
        note: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E: Into<crate::StackError>> ResultExt<T> for Result<T, E> {
    #[track_caller]
    fn context<C: Into<String>>(
        self,
        note: C,
    ) -> Result<T, crate::StackError> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => Err(err.into().context(note)),
        }
    }

    #[track_caller]
    fn with_context<C, F>(
        self,
        note: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        match self {
            Ok(value) => Ok(value),
            Err(err) => Err(err.into().context(note())),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
