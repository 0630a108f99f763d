pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;

#[cfg(test)]
mod routes_test;

pub use error::{ApiError, ApiResult};
pub use response::ApiResponse;
pub use routes::{create_routes, AppState};
