use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::Layer as LayerTrait,
    registry::LookupSpan,
};

use crate::logging::config::LogFormat;

/// Опции форматирования, общие для консоли и файла.
#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    pub format: LogFormat,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
}

/// Собирает fmt-слой заданного формата.
/// Возвращаем boxed trait-объект, чтобы стереть конкретный тип формата
/// (json/pretty/compact).
pub fn build_formatter<S, W>(
    options: FormatOptions,
    writer: W,
) -> Box<dyn LayerTrait<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match options.format {
        LogFormat::Json => Box::new(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(writer)
                .with_ansi(false)
                .with_target(options.with_target)
                .with_thread_ids(options.with_thread_ids)
                .with_line_number(options.with_line_numbers),
        ),
        LogFormat::Pretty => Box::new(
            fmt::layer()
                .pretty()
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(writer)
                .with_ansi(options.with_ansi)
                .with_target(options.with_target)
                .with_thread_ids(options.with_thread_ids)
                .with_line_number(options.with_line_numbers),
        ),
        LogFormat::Compact => Box::new(
            fmt::layer()
                .compact()
                .with_writer(writer)
                .with_ansi(options.with_ansi)
                .with_target(options.with_target)
                .with_thread_ids(options.with_thread_ids)
                .with_line_number(options.with_line_numbers),
        ),
    }
}
