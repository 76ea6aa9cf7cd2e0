use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const COMPLETED_MESSAGE: &str = "MLflow tracking server shutdown completed";
pub const NOTHING_TO_STOP_MESSAGE: &str = "No running MLflow tracking servers found";
pub const INTERNAL_ERROR_PREFIX: &str = "Internal server error";

/// Lifecycle status of a tracking server as seen by the shutdown job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServerStatus {
    InService,
    Stopped,
    Creating,
    Failed,
    Other(String),
}

impl ServerStatus {
    /// Maps a raw control-plane status onto the statuses the job reasons about.
    ///
    /// SageMaker reports `Created`, `Started`, `Updated` and
    /// `MaintenanceComplete` for a server that is up and billing; all of them
    /// count as running. Transitional states stay `Other` so they are never
    /// acted on.
    pub fn from_control_plane(raw: &str) -> Self {
        match raw {
            "InService" | "Created" | "Started" | "Updated" | "MaintenanceComplete" => {
                Self::InService
            }
            "Stopped" => Self::Stopped,
            "Creating" => Self::Creating,
            value if value.ends_with("Failed") => Self::Failed,
            value => Self::Other(value.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::InService => "InService",
            Self::Stopped => "Stopped",
            Self::Creating => "Creating",
            Self::Failed => "Failed",
            Self::Other(value) => value,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::InService)
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingServer {
    pub name: String,
    pub arn: String,
    pub status: ServerStatus,
}

impl TrackingServer {
    /// Validates a raw listing entry. A server without a name cannot be
    /// addressed by the stop action, so it fails the listing.
    pub fn from_summary(summary: TrackingServerSummary) -> Result<Self, ShutdownError> {
        let arn = summary.arn.unwrap_or_default();
        let name = match summary.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(ShutdownError::MissingServerName(arn)),
        };
        let status = summary
            .status
            .as_deref()
            .map(ServerStatus::from_control_plane)
            .unwrap_or_else(|| ServerStatus::Other("Unknown".to_string()));

        Ok(Self { name, arn, status })
    }
}

/// Listing entry as returned by the control plane, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingServerSummary {
    pub name: Option<String>,
    pub arn: Option<String>,
    pub status: Option<String>,
}

/// One page of a paginated tracking-server listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingServerPage {
    pub servers: Vec<TrackingServerSummary>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopResult {
    Stopped,
    Failed { error: String },
}

/// Result of a single stop attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopOutcome {
    pub name: String,
    pub arn: String,
    pub result: StopResult,
}

impl StopOutcome {
    pub fn stopped(server: &TrackingServer) -> Self {
        Self {
            name: server.name.clone(),
            arn: server.arn.clone(),
            result: StopResult::Stopped,
        }
    }

    pub fn failed(server: &TrackingServer, error: impl Into<String>) -> Self {
        Self {
            name: server.name.clone(),
            arn: server.arn.clone(),
            result: StopResult::Failed {
                error: error.into(),
            },
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.result, StopResult::Stopped)
    }
}

/// Aggregate result of one run, produced once at reporting time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub total_servers: usize,
    pub stopped: Vec<StopOutcome>,
    pub failed: Vec<StopOutcome>,
    pub timestamp: DateTime<Utc>,
}

impl RunSummary {
    /// Splits outcomes into the stopped and failed lists, keeping inventory order.
    pub fn from_outcomes(
        total_servers: usize,
        outcomes: Vec<StopOutcome>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let (stopped, failed): (Vec<_>, Vec<_>) =
            outcomes.into_iter().partition(StopOutcome::is_stopped);
        Self {
            total_servers,
            stopped,
            failed,
            timestamp,
        }
    }

    pub fn stopped_count(&self) -> usize {
        self.stopped.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn stopped_names(&self) -> Vec<String> {
        self.stopped.iter().map(|outcome| outcome.name.clone()).collect()
    }

    pub fn failed_names(&self) -> Vec<String> {
        self.failed.iter().map(|outcome| outcome.name.clone()).collect()
    }

    pub fn completed_body(&self) -> ShutdownCompletedBody {
        ShutdownCompletedBody {
            message: COMPLETED_MESSAGE.to_string(),
            servers_stopped: self.stopped_count(),
            servers_failed: self.failed_count(),
            total_servers: self.total_servers,
            stopped_servers: self.stopped_names(),
            failed_servers: self.failed_names(),
            timestamp: self.timestamp.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShutdownCompletedBody {
    pub message: String,
    pub servers_stopped: usize,
    pub servers_failed: usize,
    pub total_servers: usize,
    pub stopped_servers: Vec<String>,
    pub failed_servers: Vec<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NothingToStopBody {
    pub message: String,
    pub servers_stopped: usize,
    pub total_servers: usize,
}

impl NothingToStopBody {
    pub fn new(total_servers: usize) -> Self {
        Self {
            message: NOTHING_TO_STOP_MESSAGE.to_string(),
            servers_stopped: 0,
            total_servers,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShutdownErrorBody {
    pub error: String,
    pub timestamp: String,
}

impl ShutdownErrorBody {
    pub fn new(error: &ShutdownError, timestamp: DateTime<Utc>) -> Self {
        Self {
            error: format!("{INTERNAL_ERROR_PREFIX}: {error}"),
            timestamp: timestamp.to_rfc3339(),
        }
    }
}

/// Failures that abort a run before any stop attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShutdownError {
    #[error("failed to list SageMaker domains: {0}")]
    DomainListing(String),
    #[error("failed to list MLflow tracking servers: {0}")]
    Listing(String),
    #[error("tracking server listing repeated next_token '{0}'")]
    PaginationLoop(String),
    #[error("tracking server summary is missing a name (arn: {0})")]
    MissingServerName(String),
}
