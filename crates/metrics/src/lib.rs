pub mod collector;
pub mod normalize;


pub use collector::{MetricsCollector, WorkerMetricsReport};
pub use normalize::normalize_payload;
