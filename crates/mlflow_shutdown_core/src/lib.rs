//! Shared domain primitives for the MLflow tracking-server shutdown job.
//!
//! This crate owns the data model, the status filter, response bodies and
//! metric observations. It intentionally excludes AWS SDK and Lambda runtime
//! concerns, which live in `mlflow_shutdown_lambda`.

pub mod contract;
pub mod metrics;
pub mod selection;
