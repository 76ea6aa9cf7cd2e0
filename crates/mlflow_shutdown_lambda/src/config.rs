use mlflow_shutdown_core::metrics::DEFAULT_METRICS_NAMESPACE;
use thiserror::Error;

pub const METRICS_NAMESPACE_VAR: &str = "SHUTDOWN_METRICS_NAMESPACE";
pub const DRY_RUN_VAR: &str = "SHUTDOWN_DRY_RUN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownConfig {
    pub metrics_namespace: String,
    /// Records running servers as stopped without calling the control plane.
    pub dry_run: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            metrics_namespace: DEFAULT_METRICS_NAMESPACE.to_string(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{name} must be a boolean, got '{value}'")]
    InvalidBool { name: &'static str, value: String },
}

impl ShutdownConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let metrics_namespace = match lookup(METRICS_NAMESPACE_VAR) {
            Some(value) if value.trim().is_empty() => {
                return Err(ConfigError::Empty(METRICS_NAMESPACE_VAR));
            }
            Some(value) => value.trim().to_string(),
            None => DEFAULT_METRICS_NAMESPACE.to_string(),
        };

        let dry_run = match lookup(DRY_RUN_VAR) {
            Some(value) => parse_flag(DRY_RUN_VAR, &value)?,
            None => false,
        };

        Ok(Self {
            metrics_namespace,
            dry_run,
        })
    }
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" => Ok(false),
        "1" | "true" | "yes" => Ok(true),
        _ => Err(ConfigError::InvalidBool {
            name,
            value: value.to_string(),
        }),
    }
}
