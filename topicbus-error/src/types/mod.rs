pub mod pubsub;

// Публичный экспорт всех типов ошибок из вложенных модулей.
pub use pubsub::*;

use crate::{ErrorExt, StatusCode};

/// Универсальная ошибка с кодом и сообщением.
#[derive(Debug, Clone)]
pub struct GenericError {
    code: StatusCode,
    message: String,
}

impl GenericError {
    pub fn new(
        code: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for GenericError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GenericError {}

impl ErrorExt for GenericError {
    fn status_code(&self) -> StatusCode {
        self.code
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Конвертация из std::io::Error (файловый sink логирования, загрузка
/// конфигурации с диска).
impl From<std::io::Error> for crate::StackError {
    fn from(err: std::io::Error) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::NotFound => StatusCode::NotFound,
            std::io::ErrorKind::TimedOut => StatusCode::Timeout,
            _ => StatusCode::Io,
        };
        crate::StackError::new(GenericError::new(code, err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_error_code_and_message() {
        let err = GenericError::new(StatusCode::InvalidConfig, "bad capacity");
        assert_eq!(err.status_code(), StatusCode::InvalidConfig);
        assert_eq!(err.to_string(), "bad capacity");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such dir");
        let stack: crate::StackError = io.into();
        assert_eq!(stack.status_code(), StatusCode::NotFound);

        let io = std::io::Error::other("disk on fire");
        let stack: crate::StackError = io.into();
        assert_eq!(stack.status_code(), StatusCode::Io);
    }
}
