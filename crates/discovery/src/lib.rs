pub mod discovery;

#[cfg(test)]
mod discovery_test;

pub use discovery::ServiceDiscovery;
