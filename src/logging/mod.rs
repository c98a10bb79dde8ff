//! Логирование на `tracing-subscriber`.
//!
//! Библиотека сама только эмитит события `tracing`. Приложение может
//! поставить свой subscriber или вызвать [`init_logging`], который
//! собирает консольный и файловый sink по [`LoggingConfig`].

pub mod config;
mod filters;
mod formatter;
pub mod handle;
pub mod sinks;

pub use self::config::{ConsoleConfig, FileConfig, LogFormat, LoggingConfig, Rotation};
pub use formatter::FormatOptions;
pub use handle::LoggingHandle;
use topicbus_error::{BusResult, GenericError, StackError, StatusCode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

/// Инициализация глобального логирования с конфигурацией.
///
/// Возвращает ошибку `AlreadyExists`, если глобальный subscriber уже
/// установлен.
pub fn init_logging(config: LoggingConfig) -> BusResult<LoggingHandle> {
    config.validate()?;

    let env_filter = filters::build_filter_from_config(&config);
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    // Console layer
    if config.console.enabled {
        layers.push(sinks::console::layer_with_config(&config.console));
    }

    // File layer
    let file_guard = if config.file.enabled {
        let (file_layer, guard) = sinks::file::layer_with_config(&config.file)?;
        layers.push(file_layer);
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| StackError::new(GenericError::new(StatusCode::AlreadyExists, e.to_string())))?;

    let file_path = config.file.enabled.then(|| config.file_path());
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        console_enabled = config.console.enabled,
        console_format = %config.console.format,
        file = ?file_path,
        "Logging system initialized"
    );

    Ok(LoggingHandle::new(file_guard, file_path))
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    /// Тест проверяет, что повторная инициализация глобального логирования
    /// возвращает ошибку, а не паникует.
    #[test]
    #[serial]
    fn test_init_logging_twice() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            level: "debug".to_string(),
            file: FileConfig {
                enabled: true,
                dir: dir.path().to_path_buf(),
                ..FileConfig::default()
            },
            ..LoggingConfig::default()
        };

        let first = init_logging(config.clone()).unwrap();
        assert!(first.has_file_sink());

        let err = init_logging(config).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::AlreadyExists);
        first.shutdown();
    }

    #[test]
    fn test_invalid_config_rejected_before_install() {
        let config = LoggingConfig {
            level: "topicbus=loud".to_string(),
            ..LoggingConfig::default()
        };
        let err = init_logging(config).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidConfig);
    }
}
