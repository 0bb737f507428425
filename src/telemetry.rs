//! Process-wide logging and metrics setup.

use anyhow::{Context, Result};
use metrics::Unit;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

/// Installs the global `fmt` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` (e.g. `info`,
/// `dingrelay=debug`) is used as the filter.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A second initialization (tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Installs the Prometheus recorder and registers metric descriptions.
pub fn install_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .context("invalid histogram buckets")?
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    metrics::describe_counter!(
        "dingrelay_notifications_total",
        Unit::Count,
        "Send requests handled, labeled by target and outcome."
    );
    metrics::describe_counter!(
        "dingrelay_fanout_total",
        Unit::Count,
        "Payloads forwarded to the third-party sink, labeled by outcome."
    );
    metrics::describe_gauge!(
        "dingrelay_config_generation",
        "The generation number of the configuration currently in use."
    );
    metrics::describe_histogram!(
        "dingrelay_send_duration_seconds",
        Unit::Seconds,
        "Time from request arrival to response for POST /{name}/send."
    );
}
