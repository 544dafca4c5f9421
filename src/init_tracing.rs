use std::fmt;

use chrono::Utc;
use color_eyre::{Result, eyre::Context as _};
use nu_ansi_term::{Color, Style};
use tracing_core::{Event, Level, Subscriber};
use tracing_subscriber::{
    EnvFilter,
    fmt::{
        FmtContext, FormatEvent, FormatFields, Layer,
        format::Writer,
    },
    prelude::*,
    registry::LookupSpan,
};

/// Formats events as `time LEVEL target: message fields`.
struct Formatter;

impl Formatter {
    fn level_style(level: Level) -> Style {
        match level {
            Level::ERROR => Color::Red.bold(),
            Level::WARN => Color::Yellow.bold(),
            Level::INFO => Color::Green.bold(),
            Level::DEBUG => Color::Blue.bold(),
            Level::TRACE => Color::Purple.bold(),
        }
    }
}

impl<S, N> FormatEvent<S, N> for Formatter
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
        let metadata = event.metadata();
        let time = Utc::now().format("%Y-%m-%d %H:%M:%S");
        let level = format!("{:>5}", metadata.level());

        if writer.has_ansi_escapes() {
            write!(
                writer,
                "{} {} {}: ",
                Color::DarkGray.paint(time.to_string()),
                Self::level_style(*metadata.level()).paint(level),
                Style::new().dimmed().paint(metadata.target()),
            )?;
        } else {
            write!(writer, "{time} {level} {}: ", metadata.target())?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

pub fn init() -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env()
        .wrap_err("invalid RUST_LOG")?
        .add_directive("serenity=warn".parse().wrap_err("invalid directive")?)
        .add_directive("tracing::span=warn".parse().wrap_err("invalid directive")?);

    tracing_subscriber::registry()
        .with(filter)
        .with(Layer::new().event_format(Formatter))
        .try_init()
        .wrap_err("failed to set the global subscriber")
}
