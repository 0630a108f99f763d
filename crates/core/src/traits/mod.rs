pub mod cache;
pub mod notification;
pub mod strategy;
pub mod subscriber;

pub use cache::{ttl, CacheStore};
pub use notification::NotificationChannel;
pub use strategy::{BalancerCandidate, LoadBalancingStrategy};
pub use subscriber::ServiceChangeListener;
