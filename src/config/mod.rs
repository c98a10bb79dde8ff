//! Конфигурация шины.
//!
//! Загружается крейтом `config`: значения по умолчанию, необязательный
//! файл и переменные окружения с префиксом `TOPICBUS_`.

pub mod settings;

pub use settings::*;
