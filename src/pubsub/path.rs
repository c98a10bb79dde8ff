use std::sync::Arc;

use topicbus_error::{PubSubError, PubSubResult};

/// Нормализованный ключ пути топика.
///
/// Пути сравниваются без учёта регистра: `"Evt.Temp"` и `"evt.temp"`
/// обозначают один и тот же топик. Исходное написание хранится отдельно для
/// диагностики и для поля `src_topic_path` в конвертах.
pub(crate) type TopicKey = Arc<str>;

/// Проверяет путь и строит ключ для реестра.
pub(crate) fn topic_key(path: &str) -> PubSubResult<TopicKey> {
    if path.trim().is_empty() {
        return Err(PubSubError::InvalidPath {
            path: path.to_string(),
        });
    }
    Ok(Arc::from(path.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_case_insensitive() {
        let a = topic_key("Evt.Temp").unwrap();
        let b = topic_key("evt.TEMP").unwrap();
        assert_eq!(a, b);
        assert_eq!(&*a, "evt.temp");
    }

    /// Тест проверяет, что пустые и пробельные пути отклоняются.
    #[test]
    fn test_blank_path_rejected() {
        for path in ["", "   ", "\t\n"] {
            let err = topic_key(path).unwrap_err();
            assert!(matches!(err, PubSubError::InvalidPath { .. }));
        }
    }
}
