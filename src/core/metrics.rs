use std::sync::OnceLock;
use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

pub(crate) fn record_parse_run(status: &'static str, elapsed: Duration) {
    metrics::counter!("parse_runs_total", "status" => status).increment(1);
    metrics::histogram!("parse_run_duration_seconds", "status" => status)
        .record(elapsed.as_secs_f64());
}

pub(crate) fn record_chunk(outcome: &'static str) {
    metrics::counter!("parse_chunks_total", "outcome" => outcome).increment(1);
}
