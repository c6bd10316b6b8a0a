use std::sync::OnceLock;

use metrics::Unit;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    // Recorder installation is process-global and not repeatable.
    if PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    tracing::info!("Prometheus recorder installed");
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    metrics::describe_counter!("http_requests_total", "HTTP requests handled, by status code");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request latency"
    );
    metrics::describe_counter!("exam_sessions_started_total", "Exam sessions opened");
    metrics::describe_counter!(
        "exam_sessions_finalized_total",
        "Exam sessions turned into submissions"
    );
    metrics::describe_counter!(
        "exam_sessions_aborted_total",
        "Exam sessions aborted by revalidation, deadline sweep or abandonment"
    );
    metrics::describe_counter!("exam_start_refusals_total", "Start attempts refused, by reason");
    metrics::describe_counter!("transcripts_uploaded_total", "Submission transcripts stored in S3");
    metrics::describe_counter!("change_signals_total", "Invalidation signals published, by scope");
}
