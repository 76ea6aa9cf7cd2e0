//! AWS-oriented adapters and handler for the MLflow tracking-server shutdown job.
//!
//! This crate owns runtime integration details (the Lambda handler, capability
//! traits for the SageMaker control plane and the CloudWatch metrics sink,
//! environment configuration and log setup). Pure domain logic stays in
//! `mlflow_shutdown_core`.

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod telemetry;
