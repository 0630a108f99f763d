use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitState {
    /// Circuit is closed - worker is eligible for selection
    Closed,
    /// Circuit is open - worker is excluded until the cooldown elapses
    Open,
}

/// Per-worker breaker entry, created lazily on the first failure signal.
/// A missing entry is equivalent to a closed breaker.
#[derive(Debug, Clone)]
struct BreakerEntry {
    state: CircuitState,
    next_retry_at: Instant,
    failure_count: u32,
}

impl BreakerEntry {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            next_retry_at: Instant::now(),
            failure_count: 0,
        }
    }
}

/// Read model of one breaker, for the balancer status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub cooldown_remaining_ms: u64,
}

/// Table of per-worker circuit breakers.
///
/// Opening a breaker is an explicit operation invoked by callers that
/// detect sustained failure; the balancer never trips it automatically
/// on a single fault.
pub struct CircuitBreakerTable {
    entries: RwLock<HashMap<String, BreakerEntry>>,
    default_cooldown: Duration,
}

impl CircuitBreakerTable {
    pub fn new(default_cooldown: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_cooldown,
        }
    }

    /// Open the breaker for `duration` (default cooldown when None)
    pub async fn open(&self, worker_id: &str, duration: Option<Duration>) {
        let cooldown = duration.unwrap_or(self.default_cooldown);
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(worker_id.to_string())
            .or_insert_with(BreakerEntry::closed);
        entry.state = CircuitState::Open;
        entry.next_retry_at = Instant::now() + cooldown;
        info!(worker_id = %worker_id, cooldown_ms = cooldown.as_millis() as u64, "circuit breaker opened");
    }

    /// An open breaker excludes the worker only while the cooldown has
    /// not elapsed; afterwards the worker becomes eligible again.
    pub async fn is_open(&self, worker_id: &str) -> bool {
        let entries = self.entries.read().await;
        match entries.get(worker_id) {
            Some(entry) => entry.state == CircuitState::Open && entry.next_retry_at > Instant::now(),
            None => false,
        }
    }

    /// Record a failure signal without tripping the breaker
    pub async fn record_failure(&self, worker_id: &str) {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(worker_id.to_string())
            .or_insert_with(BreakerEntry::closed);
        entry.failure_count += 1;
    }

    /// Reset to closed with failure_count = 0 (called on successful forward)
    pub async fn reset(&self, worker_id: &str) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(worker_id) {
            entry.state = CircuitState::Closed;
            entry.failure_count = 0;
        }
    }

    /// Remaining cooldown, used as the retry hint in error responses
    pub async fn cooldown_remaining(&self, worker_id: &str) -> Option<Duration> {
        let entries = self.entries.read().await;
        entries.get(worker_id).and_then(|entry| {
            if entry.state == CircuitState::Open {
                entry.next_retry_at.checked_duration_since(Instant::now())
            } else {
                None
            }
        })
    }

    pub async fn snapshot(&self, worker_id: &str) -> BreakerSnapshot {
        let entries = self.entries.read().await;
        match entries.get(worker_id) {
            Some(entry) => BreakerSnapshot {
                state: if entry.state == CircuitState::Open
                    && entry.next_retry_at > Instant::now()
                {
                    CircuitState::Open
                } else {
                    CircuitState::Closed
                },
                failure_count: entry.failure_count,
                cooldown_remaining_ms: entry
                    .next_retry_at
                    .checked_duration_since(Instant::now())
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0),
            },
            None => BreakerSnapshot {
                state: CircuitState::Closed,
                failure_count: 0,
                cooldown_remaining_ms: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_entry_is_closed() {
        let table = CircuitBreakerTable::new(Duration::from_secs(60));
        assert!(!table.is_open("w1").await);
        let snapshot = table.snapshot("w1").await;
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
    }

    #[tokio::test]
    async fn test_open_excludes_until_cooldown_elapses() {
        let table = CircuitBreakerTable::new(Duration::from_secs(60));
        table.open("w1", Some(Duration::from_millis(50))).await;
        assert!(table.is_open("w1").await);
        assert!(table.cooldown_remaining("w1").await.is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        // cooldown elapsed, worker eligible again
        assert!(!table.is_open("w1").await);
    }

    #[tokio::test]
    async fn test_reset_clears_failure_count() {
        let table = CircuitBreakerTable::new(Duration::from_secs(60));
        table.record_failure("w1").await;
        table.record_failure("w1").await;
        table.open("w1", Some(Duration::from_secs(60))).await;
        assert_eq!(table.snapshot("w1").await.failure_count, 2);

        table.reset("w1").await;
        assert!(!table.is_open("w1").await);
        assert_eq!(table.snapshot("w1").await.failure_count, 0);
    }

    #[tokio::test]
    async fn test_record_failure_does_not_trip() {
        let table = CircuitBreakerTable::new(Duration::from_secs(60));
        for _ in 0..10 {
            table.record_failure("w1").await;
        }
        // failures alone never open the breaker
        assert!(!table.is_open("w1").await);
        assert_eq!(table.snapshot("w1").await.failure_count, 10);
    }
}
