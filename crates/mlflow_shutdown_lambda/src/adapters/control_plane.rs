use mlflow_shutdown_core::contract::TrackingServerPage;

pub trait TrackingServerControlPlane {
    fn count_domains(&self) -> Result<usize, String>;
    fn list_tracking_servers_page(&self, next_token: Option<&str>)
        -> Result<TrackingServerPage, String>;
    fn stop_tracking_server(&self, name: &str) -> Result<(), String>;
}
