#![allow(dead_code)]

use std::sync::Mutex;

use mlflow_shutdown_core::contract::{TrackingServerPage, TrackingServerSummary};
use mlflow_shutdown_core::metrics::MetricObservation;
use mlflow_shutdown_lambda::adapters::control_plane::TrackingServerControlPlane;
use mlflow_shutdown_lambda::adapters::metrics_sink::MetricsSink;

pub fn summary(name: &str, status: &str) -> TrackingServerSummary {
    TrackingServerSummary {
        name: Some(name.to_string()),
        arn: Some(format!(
            "arn:aws:sagemaker:us-east-1:123456789012:mlflow-tracking-server/{name}"
        )),
        status: Some(status.to_string()),
    }
}

/// Single-page control plane that records every stop call.
///
/// Successful stops flip the server to `Stopped`, so a second run sees the
/// state the first run left behind.
pub struct FakeControlPlane {
    servers: Mutex<Vec<TrackingServerSummary>>,
    failing_stops: Vec<String>,
    listing_error: Option<String>,
    domain_error: Option<String>,
    stop_calls: Mutex<Vec<String>>,
}

impl FakeControlPlane {
    pub fn new(servers: Vec<TrackingServerSummary>) -> Self {
        Self {
            servers: Mutex::new(servers),
            failing_stops: Vec::new(),
            listing_error: None,
            domain_error: None,
            stop_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, names: &[&str]) -> Self {
        self.failing_stops = names.iter().map(|name| name.to_string()).collect();
        self
    }

    pub fn with_listing_error(mut self, message: &str) -> Self {
        self.listing_error = Some(message.to_string());
        self
    }

    pub fn with_domain_error(mut self, message: &str) -> Self {
        self.domain_error = Some(message.to_string());
        self
    }

    pub fn stop_calls(&self) -> Vec<String> {
        self.stop_calls.lock().expect("poisoned mutex").clone()
    }
}

impl TrackingServerControlPlane for FakeControlPlane {
    fn count_domains(&self) -> Result<usize, String> {
        match &self.domain_error {
            Some(message) => Err(message.clone()),
            None => Ok(1),
        }
    }

    fn list_tracking_servers_page(
        &self,
        _next_token: Option<&str>,
    ) -> Result<TrackingServerPage, String> {
        if let Some(message) = &self.listing_error {
            return Err(message.clone());
        }

        Ok(TrackingServerPage {
            servers: self.servers.lock().expect("poisoned mutex").clone(),
            next_token: None,
        })
    }

    fn stop_tracking_server(&self, name: &str) -> Result<(), String> {
        self.stop_calls
            .lock()
            .expect("poisoned mutex")
            .push(name.to_string());

        if self.failing_stops.iter().any(|failing| failing == name) {
            return Err(format!("ConflictException: {name} is busy"));
        }

        let mut servers = self.servers.lock().expect("poisoned mutex");
        if let Some(server) = servers
            .iter_mut()
            .find(|server| server.name.as_deref() == Some(name))
        {
            server.status = Some("Stopped".to_string());
        }
        Ok(())
    }
}

pub struct CapturingMetricsSink {
    batches: Mutex<Vec<(String, Vec<MetricObservation>)>>,
    fail: bool,
}

impl CapturingMetricsSink {
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn batches(&self) -> Vec<(String, Vec<MetricObservation>)> {
        self.batches.lock().expect("poisoned mutex").clone()
    }

    pub fn value(&self, batch: usize, metric_name: &str) -> f64 {
        let batches = self.batches();
        batches[batch]
            .1
            .iter()
            .find(|observation| observation.metric_name == metric_name)
            .map(|observation| observation.value)
            .expect("metric should be present")
    }
}

impl MetricsSink for CapturingMetricsSink {
    fn put_metric_data(
        &self,
        namespace: &str,
        observations: &[MetricObservation],
    ) -> Result<(), String> {
        self.batches
            .lock()
            .expect("poisoned mutex")
            .push((namespace.to_string(), observations.to_vec()));

        if self.fail {
            return Err("AccessDenied: cloudwatch:PutMetricData".to_string());
        }
        Ok(())
    }
}
