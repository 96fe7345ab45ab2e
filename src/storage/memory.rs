//! In-process store backed by a concurrent hash map.

use super::{KvStore, StoreError};
use crate::time::{SystemTimeSource, TimeSource};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use std::sync::Arc;

struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Expired entries are dropped lazily when touched.
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    time_source: Arc<dyn TimeSource>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_time_source(Arc::new(SystemTimeSource))
    }

    pub fn with_time_source(time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            entries: DashMap::new(),
            time_source,
        }
    }

    /// Expiry for a TTL starting now, saturating at the latest representable time.
    fn expiry(&self, ttl_secs: u64) -> DateTime<Utc> {
        i64::try_from(ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| self.time_source.now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.time_source.now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run the expiry sweep.
///
/// Keys that are never read again (abandoned nonces, rate-limit windows,
/// replaced sessions) are otherwise never dropped.
pub async fn run_sweep_loop(store: Arc<MemoryStore>, interval: std::time::Duration) {
    loop {
        tokio::time::sleep(interval).await;

        let purged = store.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, remaining = store.len(), "Expired store entries purged");
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.time_source.now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, e| e.expires_at <= now);
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: self.expiry(ttl_secs),
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = self.time_source.now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, e)| e.expires_at > now))
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.time_source.now();
        Ok(self
            .entries
            .remove(key)
            .filter(|(_, e)| e.expires_at > now)
            .map(|(_, e)| e.value))
    }

    async fn incr_with_ttl(&self, key: &str, ttl_secs: u64) -> Result<u64, StoreError> {
        let now = self.time_source.now();
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) if occupied.get().expires_at > now => {
                let entry = occupied.get_mut();
                let count = entry
                    .value
                    .parse::<u64>()
                    .map_err(|_| StoreError::InvalidCounter(key.to_string()))?
                    + 1;
                entry.value = count.to_string();
                Ok(count)
            }
            MapEntry::Occupied(mut occupied) => {
                occupied.insert(Entry {
                    value: "1".to_string(),
                    expires_at: self.expiry(ttl_secs),
                });
                Ok(1)
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry {
                    value: "1".to_string(),
                    expires_at: self.expiry(ttl_secs),
                });
                Ok(1)
            }
        }
    }
}
