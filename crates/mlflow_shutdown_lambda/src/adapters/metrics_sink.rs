use mlflow_shutdown_core::metrics::MetricObservation;

pub trait MetricsSink {
    fn put_metric_data(&self, namespace: &str, observations: &[MetricObservation])
        -> Result<(), String>;
}
