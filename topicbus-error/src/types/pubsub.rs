use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки ядра pub/sub.
///
/// Все варианты описывают восстанавливаемые ошибки вызывающей стороны, которые
/// возвращаются синхронно из вызова-нарушителя.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PubSubError {
    /// Топик с таким путём уже существует и жив.
    #[error("topic '{path}' already exists")]
    AlreadyExists { path: String },

    /// Объект не найден: топик при `must_exist`, подписка без топиков и т.п.
    #[error("{what} '{name}' not found")]
    NotFound { what: &'static str, name: String },

    /// Тип полезной нагрузки несовместим с объявленным типом топика или с
    /// типом, к которому её приводят при чтении.
    #[error("payload type mismatch: got '{actual}', expected '{expected}'")]
    TypeMismatch {
        actual: &'static str,
        expected: &'static str,
    },

    /// Операция над объектом, который ещё не был инициализирован
    /// (пустой дескриптор топика, подписка без id, отсутствующее событие).
    #[error("{what} is not ready")]
    NotReady { what: &'static str },

    /// Пустой или состоящий из пробелов путь топика.
    #[error("invalid topic path '{path}'")]
    InvalidPath { path: String },

    /// Достигнут сконфигурированный лимит топиков или подписчиков.
    #[error("{what} limit ({limit}) exceeded")]
    LimitExceeded { what: &'static str, limit: usize },
}

impl ErrorExt for PubSubError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::AlreadyExists { .. } => StatusCode::AlreadyExists,
            Self::NotFound { .. } => StatusCode::NotFound,
            Self::TypeMismatch { .. } => StatusCode::TypeMismatch,
            Self::NotReady { .. } => StatusCode::NotReady,
            Self::InvalidPath { .. } => StatusCode::InvalidPath,
            Self::LimitExceeded { what, .. } if *what == "topic" => StatusCode::TopicLimitExceeded,
            Self::LimitExceeded { what, .. } if *what == "subscriber" => {
                StatusCode::SubscriberLimitExceeded
            }
            Self::LimitExceeded { .. } => StatusCode::QuotaExceeded,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "pubsub".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        match self {
            Self::AlreadyExists { path } | Self::InvalidPath { path } => {
                tags.push(("topic", path.clone()));
            }
            Self::NotFound { what, name } => {
                tags.push(("object", what.to_string()));
                tags.push(("name", name.clone()));
            }
            Self::TypeMismatch { actual, expected } => {
                tags.push(("actual_type", actual.to_string()));
                tags.push(("expected_type", expected.to_string()));
            }
            Self::LimitExceeded { limit, .. } => {
                tags.push(("limit", limit.to_string()));
            }
            Self::NotReady { .. } => {}
        }

        tags
    }
}
