pub mod control_plane;
pub mod metrics_sink;
