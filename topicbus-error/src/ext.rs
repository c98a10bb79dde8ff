use std::{any::Any, error::Error};

use crate::StatusCode;

/// Общий интерфейс ошибок шины. Трейт object-safe: [`StackError`]
/// хранит корневую ошибку как `Arc<dyn ErrorExt>`.
///
/// [`StackError`]: crate::StackError
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// По умолчанию [`StatusCode::Internal`].
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    fn as_any(&self) -> &dyn Any;

    /// Текст, который можно показать вызывающему коду. Для критичных кодов
    /// детали скрываются.
    fn client_message(&self) -> String {
        if self.status_code().is_critical() {
            "Internal error".to_string()
        } else {
            self.to_string()
        }
    }

    /// Пары ключ–значение для структурных полей `tracing`.
    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("error_type", self.type_name()),
            ("status_code", self.status_code().to_string()),
        ]
    }

    /// Имя типа без пути модулей.
    fn type_name(&self) -> String {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full).to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;

    use super::*;

    #[derive(Debug)]
    struct Opaque(&'static str);

    impl fmt::Display for Opaque {
        fn fmt(
            &self,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            write!(f, "opaque failure: {}", self.0)
        }
    }

    impl Error for Opaque {}

    impl ErrorExt for Opaque {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct MissingTopic(&'static str);

    impl fmt::Display for MissingTopic {
        fn fmt(
            &self,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            write!(f, "topic '{}' not found", self.0)
        }
    }

    impl Error for MissingTopic {}

    impl ErrorExt for MissingTopic {
        fn status_code(&self) -> StatusCode {
            StatusCode::NotFound
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Тест проверяет, что ошибка без своего кода считается внутренней и
    /// не раскрывает текст.
    #[test]
    fn test_default_status_hides_details() {
        let err = Opaque("secret");
        assert_eq!(err.status_code(), StatusCode::Internal);
        assert_eq!(err.client_message(), "Internal error");
    }

    #[test]
    fn test_client_message_passes_through() {
        let err = MissingTopic("evt.temp");
        assert_eq!(err.client_message(), "topic 'evt.temp' not found");
        assert_eq!(
            err.as_any().downcast_ref::<MissingTopic>().map(|m| m.0),
            Some("evt.temp")
        );
    }

    /// Тест проверяет теги: короткое имя типа и код статуса.
    #[test]
    fn test_metrics_tags() {
        let tags = MissingTopic("t").metrics_tags();
        assert_eq!(tags[0], ("error_type", "MissingTopic".to_string()));
        assert_eq!(tags[1], ("status_code", "NotFound (2000)".to_string()));
    }
}
