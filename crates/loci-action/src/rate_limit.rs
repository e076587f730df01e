//! Notification rate limiting over an injected counter store.
//!
//! The counter store is a seam: single-instance deployments use the
//! in-memory map, multi-instance deployments inject an external keyed
//! counter (e.g. Redis) so the cap holds across processes.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use loci_core::error::LociError;
use loci_core::types::TenantId;

/// Keyed fixed-window counters.
pub trait CounterStore: Send + Sync {
    /// Increment the counter for `key` in the current window of
    /// `window_secs` seconds and return the new count.
    fn increment(&self, key: &str, window_secs: u64) -> Result<u64, LociError>;
}

/// In-memory counter store for single-instance deployments.
#[derive(Default)]
pub struct MemoryCounterStore {
    windows: Mutex<HashMap<String, (u64, u64)>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn increment_at(&self, key: &str, window_secs: u64, now: u64) -> Result<u64, LociError> {
        let window_start = now - (now % window_secs.max(1));
        let mut windows = self
            .windows
            .lock()
            .map_err(|e| LociError::Storage(format!("Counter lock poisoned: {}", e)))?;

        let entry = windows.entry(key.to_string()).or_insert((window_start, 0));
        if entry.0 != window_start {
            *entry = (window_start, 0);
        }
        entry.1 += 1;
        Ok(entry.1)
    }
}

impl CounterStore for MemoryCounterStore {
    fn increment(&self, key: &str, window_secs: u64) -> Result<u64, LociError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.increment_at(key, window_secs, now)
    }
}

/// Per-tenant fixed-window cap on notification delivery.
pub struct NotificationRateLimiter {
    max_per_minute: u32,
    counters: std::sync::Arc<dyn CounterStore>,
}

impl NotificationRateLimiter {
    pub fn new(max_per_minute: u32, counters: std::sync::Arc<dyn CounterStore>) -> Self {
        Self {
            max_per_minute,
            counters,
        }
    }

    /// Whether a notification for this tenant is allowed right now.
    pub fn allow(&self, tenant: TenantId) -> Result<bool, LociError> {
        let count = self
            .counters
            .increment(&format!("notify:{}", tenant), 60)?;
        Ok(count <= self.max_per_minute as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use uuid::Uuid;

    #[test]
    fn test_counts_within_window() {
        let store = MemoryCounterStore::new();
        assert_eq!(store.increment_at("k", 60, 1000).unwrap(), 1);
        assert_eq!(store.increment_at("k", 60, 1010).unwrap(), 2);
        assert_eq!(store.increment_at("k", 60, 1059).unwrap(), 3);
    }

    #[test]
    fn test_window_rollover_resets() {
        let store = MemoryCounterStore::new();
        assert_eq!(store.increment_at("k", 60, 1000).unwrap(), 1);
        assert_eq!(store.increment_at("k", 60, 1020).unwrap(), 2);
        // 1080 falls in the next minute window.
        assert_eq!(store.increment_at("k", 60, 1080).unwrap(), 1);
    }

    #[test]
    fn test_keys_are_independent() {
        let store = MemoryCounterStore::new();
        assert_eq!(store.increment_at("a", 60, 1000).unwrap(), 1);
        assert_eq!(store.increment_at("b", 60, 1000).unwrap(), 1);
        assert_eq!(store.increment_at("a", 60, 1001).unwrap(), 2);
    }

    #[test]
    fn test_limiter_allows_up_to_cap() {
        let limiter =
            NotificationRateLimiter::new(2, Arc::new(MemoryCounterStore::new()));
        let tenant = TenantId(Uuid::new_v4());
        assert!(limiter.allow(tenant).unwrap());
        assert!(limiter.allow(tenant).unwrap());
        assert!(!limiter.allow(tenant).unwrap());
    }

    #[test]
    fn test_limiter_is_per_tenant() {
        let limiter =
            NotificationRateLimiter::new(1, Arc::new(MemoryCounterStore::new()));
        let (t1, t2) = (TenantId(Uuid::new_v4()), TenantId(Uuid::new_v4()));
        assert!(limiter.allow(t1).unwrap());
        assert!(!limiter.allow(t1).unwrap());
        // A different tenant has its own window.
        assert!(limiter.allow(t2).unwrap());
    }
}
