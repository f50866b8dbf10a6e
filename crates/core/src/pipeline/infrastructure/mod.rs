pub mod metrics_reporter;
pub mod system_monitor;
