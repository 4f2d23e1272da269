//! Engine configuration.

use std::time::Duration;

/// Tunables for the transition engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Hard cap on bulk batch size; oversized batches are rejected before
    /// any work begins.
    pub max_bulk_size: usize,
    /// Concurrent in-flight items during bulk execution.
    pub bulk_fan_out: usize,
    /// Bound on every store operation; an elapsed timeout is treated as a
    /// failed attempt, never assumed successful.
    pub store_timeout: Duration,
    /// Append a `success=false` history record for rejected attempts.
    pub record_failed_attempts: bool,
    /// Read-cache capacity (instances).
    pub cache_capacity: u64,
    /// Read-cache entry lifetime.
    pub cache_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_bulk_size: 100,
            bulk_fan_out: 16,
            store_timeout: Duration::from_secs(5),
            record_failed_attempts: true,
            cache_capacity: 1024,
            cache_ttl: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    pub fn with_max_bulk_size(mut self, cap: usize) -> Self {
        self.max_bulk_size = cap;
        self
    }

    pub fn with_bulk_fan_out(mut self, width: usize) -> Self {
        self.bulk_fan_out = width.max(1);
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_record_failed_attempts(mut self, record: bool) -> Self {
        self.record_failed_attempts = record;
        self
    }

    pub fn with_cache(mut self, capacity: u64, ttl: Duration) -> Self {
        self.cache_capacity = capacity;
        self.cache_ttl = ttl;
        self
    }
}
