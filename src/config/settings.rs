use std::{path::Path, time::Duration};

use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use topicbus_error::{ensure, BusResult, GenericError, StackError, StatusCode};

/// Префикс переменных окружения: `TOPICBUS_MAX_TOPICS=128` и т.п.
pub const ENV_PREFIX: &str = "TOPICBUS";

/// Настройки шины pub/sub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubConfig {
    /// Ёмкость очереди асинхронного подписчика по умолчанию.
    pub async_queue_capacity: usize,
    /// Максимум одновременно зарегистрированных топиков.
    pub max_topics: usize,
    /// Максимум записей в таблице подписчиков.
    pub max_subscribers: usize,
    /// Период попутной уборки реестра; 0 отключает её.
    pub scavenge_interval_secs: u64,
}

impl PubSubConfig {
    /// Значения по умолчанию, перекрытые переменными окружения `TOPICBUS_*`.
    pub fn load() -> BusResult<Self> {
        Self::build(Self::defaults()?)
    }

    /// Как [`PubSubConfig::load`], но сначала читает файл (TOML, YAML, JSON
    /// по расширению). Переменные окружения имеют приоритет над файлом.
    pub fn load_from(path: impl AsRef<Path>) -> BusResult<Self> {
        let path = path.as_ref();
        ensure!(
            path.exists(),
            StatusCode::NotFound,
            "config file not found: {}",
            path.display()
        );
        let builder = Self::defaults()?.add_source(File::from(path));
        Self::build(builder)
    }

    /// Отклоняет нулевые ёмкости и лимиты.
    pub fn validate(&self) -> BusResult<()> {
        ensure!(
            self.async_queue_capacity > 0,
            StatusCode::InvalidConfig,
            "async_queue_capacity must be positive"
        );
        ensure!(
            self.max_topics > 0,
            StatusCode::InvalidConfig,
            "max_topics must be positive"
        );
        ensure!(
            self.max_subscribers > 0,
            StatusCode::InvalidConfig,
            "max_subscribers must be positive"
        );
        Ok(())
    }

    pub fn scavenge_interval(&self) -> Duration {
        Duration::from_secs(self.scavenge_interval_secs)
    }

    fn defaults() -> BusResult<ConfigBuilder<config::builder::DefaultState>> {
        let defaults = Self::default();
        Config::builder()
            .set_default("async_queue_capacity", defaults.async_queue_capacity as u64)
            .and_then(|b| b.set_default("max_topics", defaults.max_topics as u64))
            .and_then(|b| b.set_default("max_subscribers", defaults.max_subscribers as u64))
            .and_then(|b| b.set_default("scavenge_interval_secs", defaults.scavenge_interval_secs))
            .map_err(config_error)
    }

    fn build(builder: ConfigBuilder<config::builder::DefaultState>) -> BusResult<Self> {
        let cfg = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .and_then(Config::try_deserialize::<Self>)
            .map_err(config_error)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            async_queue_capacity: 4192,
            max_topics: 8192,
            max_subscribers: 32768,
            scavenge_interval_secs: 300,
        }
    }
}

pub(crate) fn config_error(err: ConfigError) -> StackError {
    StackError::new(GenericError::new(StatusCode::InvalidConfig, err.to_string()))
}
