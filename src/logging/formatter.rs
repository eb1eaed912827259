//! Event formatters backing [`setup_logging`](super::setup_logging).
//!
//! Two formats, selected by the `--tracing` flag:
//!
//! - **pretty** -- colored single-line console output for development
//! - **json** -- one JSON object per line for container log collectors

use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use yansi::Paint;

/// Colored console formatter: `HH:MM:SS.mmm LEVEL target message key=value`.
pub struct CustomPrettyFormatter;

impl<S, N> FormatEvent<S, N> for CustomPrettyFormatter
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
        let meta = event.metadata();

        let timestamp = chrono::Local::now().format("%H:%M:%S%.3f").to_string();
        write!(writer, "{} ", timestamp.dim())?;

        // Pre-padded so columns line up regardless of color codes.
        match *meta.level() {
            Level::ERROR => write!(writer, "{} ", "ERROR".red().bold())?,
            Level::WARN => write!(writer, "{} ", " WARN".yellow().bold())?,
            Level::INFO => write!(writer, "{} ", " INFO".green())?,
            Level::DEBUG => write!(writer, "{} ", "DEBUG".blue())?,
            Level::TRACE => write!(writer, "{} ", "TRACE".magenta())?,
        }

        write!(writer, "{} ", meta.target().dim())?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Field formatter printing the message bare and the rest as `key=value`.
pub fn compact_fields() -> CompactFields {
    CompactFields
}

pub struct CompactFields;

impl<'writer> FormatFields<'writer> for CompactFields {
    fn format_fields<R: tracing_subscriber::field::RecordFields>(
        &self,
        mut writer: Writer<'writer>,
        fields: R,
    ) -> fmt::Result {
        let mut visitor = CompactVisitor {
            writer: &mut writer,
            result: Ok(()),
        };
        fields.record(&mut visitor);
        visitor.result
    }
}

struct CompactVisitor<'a, 'writer> {
    writer: &'a mut Writer<'writer>,
    result: fmt::Result,
}

impl CompactVisitor<'_, '_> {
    fn record(&mut self, field: &Field, value: fmt::Arguments<'_>) {
        if self.result.is_err() || field.name().starts_with("log.") {
            return;
        }
        self.result = if field.name() == "message" {
            write!(self.writer, "{value}")
        } else {
            write!(self.writer, " {}{}{value}", field.name().dim(), "=".dim())
        };
    }
}

impl Visit for CompactVisitor<'_, '_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, format_args!("{value}"));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record(field, format_args!("{value:?}"));
    }
}

/// JSON-lines formatter for structured log shipping.
pub struct CustomJsonFormatter;

impl<S, N> FormatEvent<S, N> for CustomJsonFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();

        let mut fields = Map::new();
        let mut visitor = JsonVisitor {
            fields: &mut fields,
        };
        event.record(&mut visitor);
        let message = fields
            .remove("message")
            .unwrap_or_else(|| Value::String(String::new()));

        let mut record = Map::new();
        record.insert(
            "timestamp".into(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        record.insert("level".into(), Value::String(meta.level().to_string()));
        record.insert("target".into(), Value::String(meta.target().to_string()));
        record.insert("message".into(), message);
        if !fields.is_empty() {
            record.insert("fields".into(), Value::Object(fields));
        }

        writeln!(writer, "{}", Value::Object(record))
    }
}

struct JsonVisitor<'a> {
    fields: &'a mut Map<String, Value>,
}

impl Visit for JsonVisitor<'_> {
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name().starts_with("log.") {
            return;
        }
        self.fields
            .insert(field.name().to_string(), format!("{value:?}").into());
    }
}
