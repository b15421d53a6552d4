//! Connector metrics, emitted through the `metrics` facade.
//!
//! No recorder is installed by this crate; hosts that want the numbers install one.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Lifecycle metrics for one connector instance
#[derive(Debug, Clone)]
pub struct ConnectorMetrics {
    connector_name: String,
}

impl ConnectorMetrics {
    pub fn new(connector_name: &str) -> Self {
        Self {
            connector_name: connector_name.to_string(),
        }
    }

    pub fn record_start_attempt(&self) {
        counter!("connector_start_attempts_total", "connector" => self.connector_name.clone())
            .increment(1);
    }

    /// Count a failed start, labelled by failure kind
    pub fn record_start_failure(&self, kind: &'static str) {
        counter!(
            "connector_start_failures_total",
            "connector" => self.connector_name.clone(),
            "kind" => kind
        )
        .increment(1);
    }

    pub fn record_readiness_latency(&self, duration: Duration) {
        histogram!("connector_readiness_check_seconds", "connector" => self.connector_name.clone())
            .record(duration.as_secs_f64());
    }

    pub fn record_task_configs(&self, count: usize) {
        gauge!("connector_task_configs", "connector" => self.connector_name.clone())
            .set(count as f64);
    }

    pub fn set_ready(&self, ready: bool) {
        gauge!("connector_ready", "connector" => self.connector_name.clone())
            .set(if ready { 1.0 } else { 0.0 });
    }
}
