//! Tracing setup for the command-line frontend.
//!
//! User-facing output is colorized per level with no timestamps or level
//! prefixes; setting `RUST_LOG` switches to the standard formatter for
//! debugging.

use colored::*;
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// A tracing event formatter that colors the whole line by severity.
///
/// Fields are buffered first because `format_fields` writes directly,
/// and the color has to wrap the complete rendered line.
pub struct ColorizedFormatter;

impl<S, N> FormatEvent<S, N> for ColorizedFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut buffer = String::new();
        let mut buf_writer = Writer::new(&mut buffer);
        ctx.format_fields(buf_writer.by_ref(), event)?;

        let colored_output = match *event.metadata().level() {
            Level::INFO => buffer.white(),
            Level::WARN => buffer.yellow(),
            Level::ERROR => buffer.red(),
            Level::DEBUG => buffer.blue(),
            Level::TRACE => buffer.purple(),
        };

        writeln!(writer, "{}", colored_output)
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence when set; otherwise `--verbose` selects
/// debug level and the clean colorized format is used.
pub fn init(verbose: bool) {
    if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
        return;
    }

    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .event_format(ColorizedFormatter)
        .with_env_filter(EnvFilter::new(default_level))
        .init();
}
