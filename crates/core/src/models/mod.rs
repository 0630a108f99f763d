pub mod health;
pub mod metrics;
pub mod service;
pub mod worker;

pub use health::{
    Alert, AlertKind, AlertSeverity, HealthHistory, HealthRecord, HEALTH_HISTORY_CAPACITY,
    HEALTH_HISTORY_DURABLE_SLICE,
};
pub use metrics::{
    classify_trend, AggregatedMetrics, MetricSample, MetricsAdvisory, Trend, WorkerTrend,
    DOMAIN_COUNTER_KEYS, METRIC_SERIES_CAPACITY,
};
pub use service::{
    DiscoveryDocument, ServiceEvent, ServiceRecord, ServiceStatus, SubServiceEntry,
};
pub use worker::{
    LifecycleResult, ServiceType, WorkerDescriptor, WorkerRegistration, WorkerStatus,
};
