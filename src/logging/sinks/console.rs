use std::io::{self, Stdout};

use tracing_subscriber::{layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::{
    config::ConsoleConfig,
    formatter::{self, FormatOptions},
};

/// Console layer с конфигурацией.
pub fn layer_with_config<S>(config: &ConsoleConfig) -> Box<dyn LayerTrait<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    // Явно указываем writer как fn() -> Stdout
    let writer: fn() -> Stdout = io::stdout;

    let options = FormatOptions {
        format: config.format,
        with_ansi: config.with_ansi,
        with_target: config.with_target,
        with_thread_ids: config.with_thread_ids,
        with_line_numbers: config.with_line_numbers,
    };
    formatter::build_formatter(options, writer)
}
