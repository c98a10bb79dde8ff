use std::{fmt, path::PathBuf, str::FromStr};

use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use topicbus_error::{bail, ensure, BusResult, StatusCode};
use tracing_subscriber::EnvFilter;

use crate::config::settings::config_error;

/// Префикс переменных окружения логирования: `TOPICBUS_LOG_LEVEL=debug`,
/// `TOPICBUS_LOG_FILE__ENABLED=true` и т.п.
pub const LOG_ENV_PREFIX: &str = "TOPICBUS_LOG";

/// Формат строк лога.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Период ротации файла лога.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub filename: String,
    pub format: LogFormat,
    pub rotation: Rotation,
}

/// Настройки логирования.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Уровень (`info`) или полная директива `EnvFilter`
    /// (`topicbus=debug,warn`). Переменная `RUST_LOG` имеет приоритет.
    pub level: String,
    pub console: ConsoleConfig,
    pub file: FileConfig,
}

impl LoggingConfig {
    /// Значения по умолчанию, перекрытые переменными `TOPICBUS_LOG_*`.
    /// Вложенные поля разделяются `__`.
    pub fn load() -> BusResult<Self> {
        let cfg = Config::builder()
            .add_source(
                Environment::with_prefix(LOG_ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(Config::try_deserialize::<Self>)
            .map_err(config_error)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> BusResult<()> {
        let directive = self.build_filter_directive();
        if let Err(err) = EnvFilter::try_new(&directive) {
            bail!(
                StatusCode::InvalidConfig,
                "invalid log filter directive '{}': {}",
                directive,
                err
            );
        }
        if self.file.enabled {
            ensure!(
                !self.file.filename.trim().is_empty(),
                StatusCode::InvalidConfig,
                "log file name must not be empty"
            );
        }
        Ok(())
    }

    /// Директива для `EnvFilter`.
    pub fn build_filter_directive(&self) -> String {
        let level = self.level.trim();
        if level.is_empty() {
            "info".to_string()
        } else {
            level.to_string()
        }
    }

    /// Полный путь к файлу лога.
    pub fn file_path(&self) -> PathBuf {
        self.file.dir.join(&self.file.filename)
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: LogFormat::Compact,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("logs"),
            filename: "topicbus.log".to_string(),
            format: LogFormat::Json,
            rotation: Rotation::Never,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}
