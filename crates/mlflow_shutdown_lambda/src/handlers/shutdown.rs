use chrono::Utc;
use mlflow_shutdown_core::contract::{
    NothingToStopBody, RunSummary, ShutdownError, ShutdownErrorBody, StopOutcome, TrackingServer,
};
use mlflow_shutdown_core::metrics::{shutdown_observations, ShutdownCounts};
use mlflow_shutdown_core::selection::{select_actionable, validate_partition};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::adapters::control_plane::TrackingServerControlPlane;
use crate::adapters::metrics_sink::MetricsSink;
use crate::config::ShutdownConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LambdaResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

/// What a run produced before reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    NothingToStop {
        total_servers: usize,
    },
    Attempted {
        total_servers: usize,
        outcomes: Vec<StopOutcome>,
    },
}

pub fn handle_shutdown_event(
    event: &Value,
    function_name: &str,
    config: &ShutdownConfig,
    control_plane: &dyn TrackingServerControlPlane,
    metrics_sink: &dyn MetricsSink,
) -> LambdaResponse {
    let trigger = event_trigger(event);
    info!(
        component = "shutdown_handler",
        event = "shutdown_started",
        function_name,
        trigger,
        dry_run = config.dry_run,
        "Starting MLflow tracking server shutdown"
    );

    match execute_run(config, control_plane) {
        Ok(RunOutcome::NothingToStop { total_servers }) => {
            info!(
                component = "shutdown_handler",
                event = "nothing_to_stop",
                total_servers,
                "No running MLflow tracking servers found"
            );
            report_metrics(
                metrics_sink,
                &config.metrics_namespace,
                ShutdownCounts::zero(),
                false,
            );
            json_response(200, &NothingToStopBody::new(total_servers))
        }
        Ok(RunOutcome::Attempted {
            total_servers,
            outcomes,
        }) => {
            let summary = RunSummary::from_outcomes(total_servers, outcomes, Utc::now());
            report_metrics(
                metrics_sink,
                &config.metrics_namespace,
                ShutdownCounts {
                    stopped: summary.stopped_count(),
                    failed: summary.failed_count(),
                    total: summary.total_servers,
                },
                false,
            );
            info!(
                component = "shutdown_handler",
                event = "shutdown_completed",
                stopped = summary.stopped_count(),
                failed = summary.failed_count(),
                total_servers = summary.total_servers,
                "Shutdown process completed"
            );
            json_response(200, &summary.completed_body())
        }
        Err(run_error) => {
            error!(
                component = "shutdown_handler",
                event = "shutdown_failed",
                error = %run_error,
                "Shutdown aborted before any stop attempt"
            );
            report_metrics(
                metrics_sink,
                &config.metrics_namespace,
                ShutdownCounts::zero(),
                true,
            );
            json_response(500, &ShutdownErrorBody::new(&run_error, Utc::now()))
        }
    }
}

/// Names what invoked the run: `aws.events` for the schedule, `direct` otherwise.
pub fn event_trigger(event: &Value) -> &str {
    event
        .get("source")
        .and_then(|source| source.as_str())
        .unwrap_or("direct")
}

/// Lists, filters and stops. Only a listing failure aborts the run.
pub fn execute_run(
    config: &ShutdownConfig,
    control_plane: &dyn TrackingServerControlPlane,
) -> Result<RunOutcome, ShutdownError> {
    let inventory = list_all_tracking_servers(control_plane)?;
    let total_servers = inventory.len();
    info!(
        component = "shutdown_handler",
        event = "inventory_listed",
        total_servers,
        "Found MLflow tracking servers"
    );

    for server in &inventory {
        debug!(
            component = "status_filter",
            event = "server_status",
            server = %server.name,
            status = %server.status,
            running = server.status.is_running(),
            "Inspected MLflow tracking server"
        );
    }

    let actionable = select_actionable(&inventory);
    info!(
        component = "shutdown_handler",
        event = "servers_filtered",
        running_servers = actionable.len(),
        "Found running MLflow tracking servers"
    );
    if actionable.is_empty() {
        return Ok(RunOutcome::NothingToStop { total_servers });
    }

    let outcomes = stop_servers(control_plane, &actionable, config.dry_run);
    if let Err(message) = validate_partition(&actionable, &outcomes) {
        error!(
            component = "shutdown_handler",
            event = "outcome_mismatch",
            error = %message,
            "Stop outcomes do not cover the running servers"
        );
    }

    Ok(RunOutcome::Attempted {
        total_servers,
        outcomes,
    })
}

/// Follows `next_token` until the control plane reports no further pages.
pub fn list_all_tracking_servers(
    control_plane: &dyn TrackingServerControlPlane,
) -> Result<Vec<TrackingServer>, ShutdownError> {
    let domain_count = control_plane
        .count_domains()
        .map_err(ShutdownError::DomainListing)?;
    info!(
        component = "inventory_lister",
        event = "domains_listed",
        domain_count,
        "Found SageMaker domains"
    );

    let mut servers = Vec::new();
    let mut next_token: Option<String> = None;
    loop {
        let page = control_plane
            .list_tracking_servers_page(next_token.as_deref())
            .map_err(ShutdownError::Listing)?;
        info!(
            component = "inventory_lister",
            event = "page_listed",
            page_size = page.servers.len(),
            "Listed MLflow tracking server page"
        );

        for summary in page.servers {
            servers.push(TrackingServer::from_summary(summary)?);
        }

        match page.next_token {
            Some(token) if next_token.as_deref() == Some(token.as_str()) => {
                return Err(ShutdownError::PaginationLoop(token));
            }
            Some(token) => next_token = Some(token),
            None => break,
        }
    }

    Ok(servers)
}

/// Attempts every stop independently, in order. A failed stop is recorded and
/// never retried within the run.
pub fn stop_servers(
    control_plane: &dyn TrackingServerControlPlane,
    servers: &[TrackingServer],
    dry_run: bool,
) -> Vec<StopOutcome> {
    servers
        .iter()
        .map(|server| {
            info!(
                component = "batch_stopper",
                event = "stop_requested",
                server = %server.name,
                "Stopping MLflow tracking server"
            );

            if dry_run {
                info!(
                    component = "batch_stopper",
                    event = "dry_run",
                    server = %server.name,
                    "Dry run, skipping stop call"
                );
                return StopOutcome::stopped(server);
            }

            match control_plane.stop_tracking_server(&server.name) {
                Ok(()) => {
                    info!(
                        component = "batch_stopper",
                        event = "stop_initiated",
                        server = %server.name,
                        "Successfully initiated stop"
                    );
                    StopOutcome::stopped(server)
                }
                Err(stop_error) => {
                    error!(
                        component = "batch_stopper",
                        event = "stop_failed",
                        server = %server.name,
                        error = %stop_error,
                        "Failed to stop server"
                    );
                    StopOutcome::failed(server, stop_error)
                }
            }
        })
        .collect()
}

/// Sends one metrics batch. Sink failures are logged and swallowed.
pub fn report_metrics(
    metrics_sink: &dyn MetricsSink,
    namespace: &str,
    counts: ShutdownCounts,
    top_level_error: bool,
) {
    let observations = shutdown_observations(counts, top_level_error, Utc::now());
    match metrics_sink.put_metric_data(namespace, &observations) {
        Ok(()) => info!(
            component = "outcome_reporter",
            event = "metrics_sent",
            namespace,
            metric_count = observations.len(),
            "Sent metrics"
        ),
        Err(sink_error) => error!(
            component = "outcome_reporter",
            event = "metrics_failed",
            namespace,
            error = %sink_error,
            "Failed to send metrics"
        ),
    }
}

fn json_response(status_code: u16, payload: &impl Serialize) -> LambdaResponse {
    let body = serde_json::to_string_pretty(payload).unwrap_or_else(|error| {
        json!({
            "error": "serialization_error",
            "message": error.to_string(),
        })
        .to_string()
    });

    LambdaResponse { status_code, body }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io;
    use std::sync::{Arc, Mutex};

    use mlflow_shutdown_core::contract::{StopResult, TrackingServerPage, TrackingServerSummary};
    use mlflow_shutdown_core::metrics::MetricObservation;

    use super::*;

    fn summary(name: &str, status: &str) -> TrackingServerSummary {
        TrackingServerSummary {
            name: Some(name.to_string()),
            arn: Some(format!(
                "arn:aws:sagemaker:us-east-1:123456789012:mlflow-tracking-server/{name}"
            )),
            status: Some(status.to_string()),
        }
    }

    struct PagedControlPlane {
        pages: HashMap<Option<String>, TrackingServerPage>,
        failing_stops: Vec<&'static str>,
        stop_calls: Mutex<Vec<String>>,
        page_requests: Mutex<Vec<Option<String>>>,
    }

    impl PagedControlPlane {
        fn new(pages: Vec<(Option<&str>, TrackingServerPage)>) -> Self {
            Self {
                pages: pages
                    .into_iter()
                    .map(|(token, page)| (token.map(str::to_string), page))
                    .collect(),
                failing_stops: Vec::new(),
                stop_calls: Mutex::new(Vec::new()),
                page_requests: Mutex::new(Vec::new()),
            }
        }

        fn stop_calls(&self) -> Vec<String> {
            self.stop_calls.lock().expect("poisoned mutex").clone()
        }

        fn page_requests(&self) -> Vec<Option<String>> {
            self.page_requests.lock().expect("poisoned mutex").clone()
        }
    }

    impl TrackingServerControlPlane for PagedControlPlane {
        fn count_domains(&self) -> Result<usize, String> {
            Ok(2)
        }

        fn list_tracking_servers_page(
            &self,
            next_token: Option<&str>,
        ) -> Result<TrackingServerPage, String> {
            let key = next_token.map(str::to_string);
            self.page_requests
                .lock()
                .expect("poisoned mutex")
                .push(key.clone());
            self.pages
                .get(&key)
                .cloned()
                .ok_or_else(|| format!("unknown page token: {key:?}"))
        }

        fn stop_tracking_server(&self, name: &str) -> Result<(), String> {
            self.stop_calls
                .lock()
                .expect("poisoned mutex")
                .push(name.to_string());
            if self.failing_stops.iter().any(|failing| *failing == name) {
                return Err(format!("ValidationException: cannot stop {name}"));
            }
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn lines(&self) -> Vec<Value> {
            let bytes = self.0.lock().expect("poisoned mutex").clone();
            String::from_utf8(bytes)
                .expect("logs should be UTF-8")
                .lines()
                .map(|line| serde_json::from_str(line).expect("log line should be JSON"))
                .collect()
        }
    }

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .expect("poisoned mutex")
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct RejectingSink;

    impl MetricsSink for RejectingSink {
        fn put_metric_data(
            &self,
            _namespace: &str,
            _observations: &[MetricObservation],
        ) -> Result<(), String> {
            Err("AccessDenied: cloudwatch:PutMetricData".to_string())
        }
    }

    #[test]
    fn event_trigger_reads_scheduler_source() {
        assert_eq!(
            event_trigger(&json!({"source": "aws.events", "detail": {}})),
            "aws.events"
        );
        assert_eq!(event_trigger(&json!({})), "direct");
        assert_eq!(event_trigger(&json!({"source": 7})), "direct");
        assert_eq!(event_trigger(&Value::Null), "direct");
    }

    #[test]
    fn metrics_sink_failure_is_logged_at_error_level() {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            report_metrics(
                &RejectingSink,
                "MLflowTrackingServer/Shutdown",
                ShutdownCounts::zero(),
                false,
            );
        });

        let record = buffer
            .lines()
            .into_iter()
            .find(|line| line["event"] == "metrics_failed")
            .expect("sink failure should be logged");
        assert_eq!(record["level"], "ERROR");
        assert!(record["error"]
            .as_str()
            .is_some_and(|error| error.contains("AccessDenied")));
    }

    #[test]
    fn lister_flattens_pages_in_control_plane_order() {
        let control_plane = PagedControlPlane::new(vec![
            (
                None,
                TrackingServerPage {
                    servers: vec![summary("a", "Started"), summary("b", "Stopped")],
                    next_token: Some("page-2".to_string()),
                },
            ),
            (
                Some("page-2"),
                TrackingServerPage {
                    servers: vec![summary("c", "Created")],
                    next_token: None,
                },
            ),
        ]);

        let servers = list_all_tracking_servers(&control_plane).expect("listing should pass");
        let names: Vec<&str> = servers.iter().map(|s| s.name.as_str()).collect();

        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(
            control_plane.page_requests(),
            vec![None, Some("page-2".to_string())]
        );
    }

    #[test]
    fn lister_fails_when_a_later_page_fails() {
        let control_plane = PagedControlPlane::new(vec![(
            None,
            TrackingServerPage {
                servers: vec![summary("a", "Started")],
                next_token: Some("missing".to_string()),
            },
        )]);

        let error = list_all_tracking_servers(&control_plane).expect_err("listing should fail");
        assert!(matches!(error, ShutdownError::Listing(_)));
    }

    #[test]
    fn lister_rejects_repeated_next_token() {
        let control_plane = PagedControlPlane::new(vec![
            (
                None,
                TrackingServerPage {
                    servers: Vec::new(),
                    next_token: Some("loop".to_string()),
                },
            ),
            (
                Some("loop"),
                TrackingServerPage {
                    servers: Vec::new(),
                    next_token: Some("loop".to_string()),
                },
            ),
        ]);

        let error = list_all_tracking_servers(&control_plane).expect_err("loop should fail");
        assert_eq!(error, ShutdownError::PaginationLoop("loop".to_string()));
    }

    #[test]
    fn stopper_continues_after_a_failure() {
        let mut control_plane = PagedControlPlane::new(Vec::new());
        control_plane.failing_stops = vec!["b"];
        let servers: Vec<TrackingServer> = ["a", "b", "c"]
            .into_iter()
            .map(|name| TrackingServer::from_summary(summary(name, "Started")).expect("server"))
            .collect();

        let outcomes = stop_servers(&control_plane, &servers, false);

        assert_eq!(control_plane.stop_calls(), vec!["a", "b", "c"]);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_stopped());
        assert!(matches!(
            &outcomes[1].result,
            StopResult::Failed { error } if error.contains("cannot stop b")
        ));
        assert!(outcomes[2].is_stopped());
    }

    #[test]
    fn dry_run_never_calls_the_control_plane() {
        let control_plane = PagedControlPlane::new(Vec::new());
        let servers =
            vec![TrackingServer::from_summary(summary("a", "Started")).expect("server")];

        let outcomes = stop_servers(&control_plane, &servers, true);

        assert!(control_plane.stop_calls().is_empty());
        assert!(outcomes[0].is_stopped());
    }

    #[test]
    fn response_serializes_status_code_in_lambda_casing() {
        let response = json_response(200, &NothingToStopBody::new(1));
        let value = serde_json::to_value(&response).expect("response should serialize");

        assert_eq!(value["statusCode"], 200);
        let body: Value = serde_json::from_str(&response.body).expect("body should parse");
        assert_eq!(body["servers_stopped"], 0);
        assert_eq!(body["total_servers"], 1);
    }
}
