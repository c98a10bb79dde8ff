use std::{fmt, panic::Location, sync::Arc};

use crate::{ErrorExt, LogLevel, PubSubError, StatusCode};

/// Ошибка инфраструктурного уровня: корневая причина плюс цепочка
/// пояснений, добавленных по пути наверх.
///
/// Клонирование дешёвое, корневая ошибка разделяется через `Arc`.
#[derive(Clone)]
pub struct StackError {
    root: Arc<dyn ErrorExt>,
    origin: &'static Location<'static>,
    frames: Vec<Frame>,
}

/// Одно пояснение в цепочке [`StackError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub note: String,
    pub location: &'static Location<'static>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StackError {
    #[track_caller]
    pub fn new<E: ErrorExt>(err: E) -> Self {
        Self {
            root: Arc::new(err),
            origin: Location::caller(),
            frames: Vec::new(),
        }
    }

    /// Добавляет пояснение с местом вызова.
    #[track_caller]
    pub fn context(
        mut self,
        note: impl Into<String>,
    ) -> Self {
        self.frames.push(Frame {
            note: note.into(),
            location: Location::caller(),
        });
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.root.status_code()
    }

    pub fn root(&self) -> &dyn ErrorExt {
        self.root.as_ref()
    }

    /// Место, где была создана ошибка.
    pub fn origin(&self) -> &'static Location<'static> {
        self.origin
    }

    /// Пояснения в порядке добавления: от ближнего к корню к внешнему.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn downcast_ref<T: ErrorExt>(&self) -> Option<&T> {
        self.root.as_any().downcast_ref::<T>()
    }

    /// Корневая ошибка ядра pub/sub, если причина в ней.
    pub fn as_pubsub(&self) -> Option<&PubSubError> {
        self.downcast_ref::<PubSubError>()
    }

    pub fn client_message(&self) -> String {
        self.root.client_message()
    }

    pub fn log_level(&self) -> LogLevel {
        self.status_code().log_level()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StackError
////////////////////////////////////////////////////////////////////////////////

impl fmt::Display for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for frame in self.frames.iter().rev() {
            write!(f, "{}: ", frame.note)?;
        }
        write!(f, "{}", self.root)
    }
}

impl fmt::Debug for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let frames: Vec<String> = self
            .frames
            .iter()
            .map(|fr| format!("{} at {}:{}", fr.note, fr.location.file(), fr.location.line()))
            .collect();
        f.debug_struct("StackError")
            .field("status_code", &self.status_code())
            .field("root", &self.root.to_string())
            .field(
                "origin",
                &format_args!("{}:{}", self.origin.file(), self.origin.line()),
            )
            .field("frames", &frames)
            .finish()
    }
}

impl std::error::Error for StackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.root.as_ref())
    }
}

impl<E: ErrorExt> From<E> for StackError {
    #[track_caller]
    fn from(err: E) -> Self {
        StackError::new(err)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
