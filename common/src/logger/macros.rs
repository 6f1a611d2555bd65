use tracing::{Span, field};

use super::TraceId;

/// Root span for a polling pass or a recovery run.
pub fn root_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "root",
        name = %name,
        trace_id = %trace_id.as_str(),
        indicator = field::Empty,
        event_id = field::Empty
    )
}

/// Child span; inherits the trace id from the enclosing root span.
pub fn child_span(name: &'static str) -> Span {
    tracing::info_span!(
        "child",
        name = %name,
        indicator = field::Empty,
        event_id = field::Empty
    )
}

/// Records indicator / event identity on the current span.
pub fn annotate_span(indicator: &str, event_id: Option<&dyn std::fmt::Display>) {
    let span = Span::current();
    span.record("indicator", &field::display(indicator));
    if let Some(id) = event_id {
        span.record("event_id", &field::display(id));
    }
}
