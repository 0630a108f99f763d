pub mod balancer;
pub mod circuit_breaker;
pub mod strategies;

#[cfg(test)]
mod strategies_test;


pub use balancer::{
    BalancerStatus, ForwardRequest, ForwardedResponse, LoadBalancer, ResponseBody,
    WorkerBalancerEntry,
};
pub use circuit_breaker::{BreakerSnapshot, CircuitBreakerTable, CircuitState};
pub use strategies::{
    create_strategy, HealthAwareStrategy, LeastConnectionsStrategy, RoundRobinStrategy,
    WeightedStrategy,
};
