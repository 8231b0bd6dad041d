//! `task_name | LEVEL | message` log lines.
//!
//! The task name comes from the event's own `task` field, else from the
//! nearest enclosing span that declared `task.name` (see
//! [`super::task::start_task_span`]). Events outside any task print `-`.

use std::fmt::Write as _;

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

const EVENT_TASK_FIELD: &str = "task";
const SPAN_TASK_FIELD: &str = "task.name";

/// Task name stashed in span extensions by [`TaskNameLayer`].
struct TaskName(String);

/// Remembers the `task.name` field of every span that declares one.
pub struct TaskNameLayer;

impl<S> Layer<S> for TaskNameLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut fields = LineFields::default();
        attrs.record(&mut fields);
        if let (Some(task), Some(span)) = (fields.task, ctx.span(id)) {
            span.extensions_mut().insert(TaskName(task));
        }
    }
}

/// Event formatter producing `task_name | LEVEL | message key=value..`.
pub struct TaskLineFormat;

impl<S, N> FormatEvent<S, N> for TaskLineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut fields = LineFields::default();
        event.record(&mut fields);

        let task = fields.task.take().or_else(|| {
            ctx.event_scope()?.find_map(|span| {
                span.extensions()
                    .get::<TaskName>()
                    .map(|name| name.0.clone())
            })
        });

        write!(
            writer,
            "{} | {} | {}",
            task.as_deref().unwrap_or("-"),
            event.metadata().level(),
            fields.message
        )?;
        for (key, value) in &fields.extra {
            write!(writer, " {key}={value}")?;
        }
        writeln!(writer)
    }
}

#[derive(Default)]
struct LineFields {
    task: Option<String>,
    message: String,
    extra: Vec<(&'static str, String)>,
}

impl Visit for LineFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            EVENT_TASK_FIELD | SPAN_TASK_FIELD => self.task = Some(value.to_string()),
            "message" => self.message = value.to_string(),
            name => self.extra.push((name, value.to_string())),
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            EVENT_TASK_FIELD | SPAN_TASK_FIELD => self.task = Some(format!("{value:?}")),
            "message" => {
                self.message.clear();
                let _ = write!(self.message, "{value:?}");
            }
            name => self.extra.push((name, format!("{value:?}"))),
        }
    }
}
