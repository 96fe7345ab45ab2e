//! Keyed store for nonces, sessions, rate-limit counters and the Discord
//! link cache.
//!
//! Handlers receive an `Arc<dyn KvStore>`; two backends exist:
//! - [`redis::RedisStore`] for deployments
//! - [`memory::MemoryStore`] for single-process runs and tests
//!
//! Values are JSON strings. Every write carries a TTL.

pub mod discord;
pub mod memory;
pub mod nonce;
pub mod redis;
pub mod session;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use zeroize::Zeroizing;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Stored value is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stored counter is not a number: {0}")]
    InvalidCounter(String),
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;

    /// Returns true if the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Get and delete in one atomic step. Of any number of concurrent
    /// callers for the same key, at most one receives the value.
    async fn take(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Increment a counter, starting its TTL window on the first increment.
    async fn incr_with_ttl(&self, key: &str, ttl_secs: u64) -> Result<u64, StoreError>;
}

/// Serialize `value` as JSON and store it with a TTL.
pub async fn set_json<T: Serialize>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
    ttl_secs: u64,
) -> Result<(), StoreError> {
    let json = Zeroizing::new(serde_json::to_string(value)?);
    store.set_ex(key, &json, ttl_secs).await
}

/// Load and deserialize a JSON value. The raw JSON is zeroized after use.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(data) => {
            let data = Zeroizing::new(data);
            Ok(Some(serde_json::from_str(&data)?))
        }
        None => Ok(None),
    }
}

/// Atomically remove and deserialize a JSON value.
pub async fn take_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.take(key).await? {
        Some(data) => {
            let data = Zeroizing::new(data);
            Ok(Some(serde_json::from_str(&data)?))
        }
        None => Ok(None),
    }
}
