pub mod config;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use models::*;
pub use orchestrator_errors::{OrchestratorError, OrchestratorResult};
pub use traits::*;
