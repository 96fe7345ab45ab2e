//! Sign-in nonce records.
//!
//! Key pattern: `nonce:{nonce}`: issued nonce (JSON), TTL = nonce lifetime.

use super::{set_json, take_json, KvStore, StoreError};
use crate::models::StoredNonce;

fn nonce_key(nonce: &str) -> String {
    format!("nonce:{}", nonce)
}

pub async fn store_nonce(
    store: &dyn KvStore,
    nonce: &StoredNonce,
    ttl_secs: u64,
) -> Result<(), StoreError> {
    set_json(store, &nonce_key(&nonce.nonce), nonce, ttl_secs).await
}

/// Consume a nonce. Returns `None` if it was never issued, has already been
/// used, or has been evicted by its TTL.
pub async fn take_nonce(
    store: &dyn KvStore,
    nonce: &str,
) -> Result<Option<StoredNonce>, StoreError> {
    take_json(store, &nonce_key(nonce)).await
}
