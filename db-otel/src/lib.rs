#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! Ambient logging and tracing for every crate above `db-kernel`: a
//! `tracing_subscriber::fmt` layer driven by `EnvFilter` by default, with an
//! optional OpenTelemetry OTLP exporter behind the `otel` feature.
//!
//! Spans are opened per query (`query_id`) and per task (`task_id`,
//! `trace_id` — the "Cycles" trace id from spec §4.1), giving the wire
//! protocol's `TaskTrace`/`PerformanceCounter` response kinds something real
//! to report.

pub mod exporter;

use tracing_subscriber::{EnvFilter, Registry};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs the process-wide subscriber: `fmt` layer plus `EnvFilter`
/// (`RUST_LOG`, defaulting to `info`), and the OTLP layer when `otel` is
/// enabled and `otlp_endpoint` is set.
pub fn init_tracing(otlp_endpoint: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    let registry = Registry::default().with(filter).with(fmt_layer);

    #[cfg(feature = "otel")]
    {
        if let Some(endpoint) = otlp_endpoint {
            match exporter::otlp_layer(endpoint) {
                Ok(otel_layer) => {
                    let _ = registry.with(otel_layer).try_init();
                    return;
                }
                Err(e) => {
                    eprintln!("failed to initialize OTLP exporter: {e}");
                }
            }
        }
    }
    #[cfg(not(feature = "otel"))]
    let _ = otlp_endpoint;

    let _ = registry.try_init();
}

/// Opens a span for one query's lifetime, tagged with its id so every task
/// and rule application nested under it correlates in the trace backend.
pub fn query_span(query_id: u64) -> tracing::Span {
    tracing::info_span!("query", query_id)
}

/// Opens a span for one task's execution, tagged with the worker running it
/// and the task's trace id (0 means untraced).
pub fn task_span(worker_id: u8, trace_id: u64) -> tracing::Span {
    tracing::debug_span!("task", worker_id, trace_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_span_carries_worker_and_trace_id() {
        let span = task_span(3, 42);
        assert_eq!(span.metadata().unwrap().name(), "task");
    }
}
