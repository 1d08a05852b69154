// packages/engine/src/observability/mod.rs
//! Logging and metrics setup
//!
//! - `init_tracing` installs the global `tracing` subscriber. `RUST_LOG`
//!   overrides the default `info` filter.
//! - `init_metrics` installs the Prometheus recorder and its HTTP listener.
//!   Without it the `metrics` macros are no-ops.

use crate::utils::config::{LogFormat, ObservabilityConfig};
use crate::utils::errors::{EngineError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = match config.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_names(true)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_names(true)
            .try_init(),
    };

    installed.map_err(|e| EngineError::ConfigError(format!("cannot install tracing subscriber: {}", e)))
}

/// Serve Prometheus metrics on `addr` when configured
pub fn init_metrics(addr: Option<&str>) -> Result<()> {
    let Some(addr) = addr else {
        return Ok(());
    };

    let listen: SocketAddr = addr
        .parse()
        .map_err(|e| EngineError::ConfigError(format!("invalid metrics address '{}': {}", addr, e)))?;

    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()
        .map_err(|e| EngineError::ConfigError(format!("cannot install metrics exporter: {}", e)))?;

    describe_metrics();
    info!("Prometheus metrics on http://{}/metrics", listen);
    Ok(())
}

fn describe_metrics() {
    metrics::describe_counter!("autopilot_ticks_total", "Completed operator ticks");
    metrics::describe_counter!("autopilot_actions_total", "Atomic operations that completed");
    metrics::describe_counter!("autopilot_action_failures_total", "Atomic operations that failed");
    metrics::describe_counter!("autopilot_lane_tasks_total", "Tasks run on the GPU lane");
    metrics::describe_counter!("autopilot_lane_task_failures_total", "GPU lane tasks that failed or panicked");
    metrics::describe_histogram!(
        "autopilot_lane_task_seconds",
        metrics::Unit::Seconds,
        "Run time of GPU lane tasks"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_disabled_without_address() {
        assert!(init_metrics(None).is_ok());
    }

    #[test]
    fn test_invalid_metrics_address() {
        assert!(matches!(init_metrics(Some("not an address")), Err(EngineError::ConfigError(_))));
    }
}
