use chrono::{DateTime, Utc};

pub const DEFAULT_METRICS_NAMESPACE: &str = "MLflowTrackingServer/Shutdown";

pub const SERVERS_STOPPED: &str = "ServersStopped";
pub const SERVERS_FAILED: &str = "ServersFailed";
pub const TOTAL_SERVERS: &str = "TotalServers";
pub const SHUTDOWN_SUCCESS: &str = "ShutdownSuccess";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricUnit {
    Count,
}

/// A single numeric data point sent to the metrics sink.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricObservation {
    pub metric_name: &'static str,
    pub value: f64,
    pub unit: MetricUnit,
    pub timestamp: DateTime<Utc>,
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownCounts {
    pub stopped: usize,
    pub failed: usize,
    pub total: usize,
}

impl ShutdownCounts {
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Builds the four-observation batch for one run.
///
/// `top_level_error` only reflects an aborted run; per-server stop failures
/// still report success.
pub fn shutdown_observations(
    counts: ShutdownCounts,
    top_level_error: bool,
    timestamp: DateTime<Utc>,
) -> Vec<MetricObservation> {
    let success = if top_level_error { 0.0 } else { 1.0 };
    [
        (SERVERS_STOPPED, counts.stopped as f64),
        (SERVERS_FAILED, counts.failed as f64),
        (TOTAL_SERVERS, counts.total as f64),
        (SHUTDOWN_SUCCESS, success),
    ]
    .into_iter()
    .map(|(metric_name, value)| MetricObservation {
        metric_name,
        value,
        unit: MetricUnit::Count,
        timestamp,
    })
    .collect()
}
