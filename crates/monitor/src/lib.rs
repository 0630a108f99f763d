pub mod channels;
pub mod monitor;


pub use channels::{LogChannel, WebhookChannel};
pub use monitor::{evaluate_probe, HealthMonitor, HealthPayload, HealthSummary};
