pub mod admin_client;
pub mod registry;

#[cfg(test)]
mod registry_test;

pub use admin_client::{AdminClient, AdminCommand};
pub use registry::WorkerRegistry;
