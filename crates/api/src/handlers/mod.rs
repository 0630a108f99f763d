pub mod balancer;
pub mod health;
pub mod metrics;
pub mod proxy;
pub mod services;
pub mod system;
pub mod workers;
