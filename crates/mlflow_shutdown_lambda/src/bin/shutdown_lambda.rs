use aws_sdk_cloudwatch::primitives::DateTime as AwsDateTime;
use aws_sdk_cloudwatch::types::{MetricDatum, StandardUnit};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use mlflow_shutdown_core::contract::{TrackingServerPage, TrackingServerSummary};
use mlflow_shutdown_core::metrics::{MetricObservation, MetricUnit};
use mlflow_shutdown_lambda::adapters::control_plane::TrackingServerControlPlane;
use mlflow_shutdown_lambda::adapters::metrics_sink::MetricsSink;
use mlflow_shutdown_lambda::config::ShutdownConfig;
use mlflow_shutdown_lambda::handlers::shutdown::{handle_shutdown_event, LambdaResponse};
use mlflow_shutdown_lambda::telemetry::init_tracing;
use serde_json::Value;

struct SageMakerControlPlane {
    client: aws_sdk_sagemaker::Client,
}

impl TrackingServerControlPlane for SageMakerControlPlane {
    fn count_domains(&self) -> Result<usize, String> {
        let client = self.client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let mut domain_count = 0usize;
                let mut next_token: Option<String> = None;
                loop {
                    let output = client
                        .list_domains()
                        .set_next_token(next_token.take())
                        .send()
                        .await
                        .map_err(|error| {
                            format!(
                                "failed to list domains: {}",
                                aws_sdk_sagemaker::error::DisplayErrorContext(&error)
                            )
                        })?;
                    domain_count += output.domains().len();
                    match output.next_token() {
                        Some(token) => next_token = Some(token.to_string()),
                        None => break,
                    }
                }
                Ok::<usize, String>(domain_count)
            })
        })
    }

    fn list_tracking_servers_page(
        &self,
        next_token: Option<&str>,
    ) -> Result<TrackingServerPage, String> {
        let client = self.client.clone();
        let next_token = next_token.map(str::to_string);

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let output = client
                    .list_mlflow_tracking_servers()
                    .set_next_token(next_token)
                    .send()
                    .await
                    .map_err(|error| {
                        format!(
                            "failed to list mlflow tracking servers: {}",
                            aws_sdk_sagemaker::error::DisplayErrorContext(&error)
                        )
                    })?;

                let servers = output
                    .tracking_server_summaries()
                    .iter()
                    .map(|summary| TrackingServerSummary {
                        name: summary.tracking_server_name().map(str::to_string),
                        arn: summary.tracking_server_arn().map(str::to_string),
                        status: summary
                            .tracking_server_status()
                            .map(|status| status.as_str().to_string()),
                    })
                    .collect();

                Ok::<TrackingServerPage, String>(TrackingServerPage {
                    servers,
                    next_token: output.next_token().map(str::to_string),
                })
            })
        })
    }

    fn stop_tracking_server(&self, name: &str) -> Result<(), String> {
        let client = self.client.clone();
        let server_name = name.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .stop_mlflow_tracking_server()
                    .tracking_server_name(server_name)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| {
                        format!(
                            "failed to stop mlflow tracking server: {}",
                            aws_sdk_sagemaker::error::DisplayErrorContext(&error)
                        )
                    })
            })
        })
    }
}

struct CloudWatchMetricsSink {
    client: aws_sdk_cloudwatch::Client,
}

impl MetricsSink for CloudWatchMetricsSink {
    fn put_metric_data(
        &self,
        namespace: &str,
        observations: &[MetricObservation],
    ) -> Result<(), String> {
        let client = self.client.clone();
        let namespace = namespace.to_string();
        let metric_data: Vec<MetricDatum> = observations.iter().map(to_metric_datum).collect();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .put_metric_data()
                    .namespace(namespace)
                    .set_metric_data(Some(metric_data))
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| {
                        format!(
                            "failed to put metric data: {}",
                            aws_sdk_cloudwatch::error::DisplayErrorContext(&error)
                        )
                    })
            })
        })
    }
}

fn to_metric_datum(observation: &MetricObservation) -> MetricDatum {
    let unit = match observation.unit {
        MetricUnit::Count => StandardUnit::Count,
    };

    MetricDatum::builder()
        .metric_name(observation.metric_name)
        .value(observation.value)
        .unit(unit)
        .timestamp(AwsDateTime::from_millis(
            observation.timestamp.timestamp_millis(),
        ))
        .build()
}

struct RuntimeDependencies {
    config: ShutdownConfig,
    control_plane: SageMakerControlPlane,
    metrics_sink: CloudWatchMetricsSink,
}

async fn handle_request(
    event: LambdaEvent<Value>,
    deps: &RuntimeDependencies,
) -> Result<LambdaResponse, Error> {
    Ok(handle_shutdown_event(
        &event.payload,
        &event.context.env_config.function_name,
        &deps.config,
        &deps.control_plane,
        &deps.metrics_sink,
    ))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing()?;

    let config = ShutdownConfig::from_env()?;
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let deps = RuntimeDependencies {
        config,
        control_plane: SageMakerControlPlane {
            client: aws_sdk_sagemaker::Client::new(&aws_config),
        },
        metrics_sink: CloudWatchMetricsSink {
            client: aws_sdk_cloudwatch::Client::new(&aws_config),
        },
    };

    let deps = &deps;
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        handle_request(event, deps).await
    }))
    .await
}
