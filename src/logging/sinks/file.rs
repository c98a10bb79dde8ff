use std::fs;

use topicbus_error::{BusResult, ResultExt};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::{
    config::{FileConfig, Rotation},
    formatter::{self, FormatOptions},
};

/// File layer с неблокирующей записью. Guard нужно держать, пока идёт
/// логирование: при его уничтожении буфер сбрасывается на диск.
pub fn layer_with_config<S>(
    config: &FileConfig
) -> BusResult<(Box<dyn LayerTrait<S> + Send + Sync>, WorkerGuard)>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fs::create_dir_all(&config.dir)
        .with_context(|| format!("create log dir {}", config.dir.display()))?;

    let appender = match config.rotation {
        Rotation::Never => rolling::never(&config.dir, &config.filename),
        Rotation::Hourly => rolling::hourly(&config.dir, &config.filename),
        Rotation::Daily => rolling::daily(&config.dir, &config.filename),
    };
    let (writer, guard) = non_blocking(appender);

    let options = FormatOptions {
        format: config.format,
        with_ansi: false,
        with_target: true,
        with_thread_ids: true,
        with_line_numbers: false,
    };
    Ok((formatter::build_formatter(options, writer), guard))
}
