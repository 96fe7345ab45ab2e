//! Session records.
//!
//! Key patterns:
//! - `session:{token}`: session data (JSON)
//! - `session_by_address:{address}`: token of the address's current session

use super::{get_json, set_json, take_json, KvStore, StoreError};
use crate::models::StoredSession;
use crate::siwe::Address;

fn session_key(token: &str) -> String {
    format!("session:{}", token)
}

fn address_key(address: &Address) -> String {
    format!("session_by_address:{}", address.to_lowercase_hex())
}

/// Store a session and make it the address's current one.
pub async fn store_session(
    store: &dyn KvStore,
    session: &StoredSession,
    ttl_secs: u64,
) -> Result<(), StoreError> {
    set_json(store, &session_key(&session.token), session, ttl_secs).await?;
    store
        .set_ex(&address_key(&session.address), &session.token, ttl_secs)
        .await
}

pub async fn get_session(
    store: &dyn KvStore,
    token: &str,
) -> Result<Option<StoredSession>, StoreError> {
    get_json(store, &session_key(token)).await
}

/// Token of the current session for `address`, if any.
pub async fn get_session_token_for_address(
    store: &dyn KvStore,
    address: &Address,
) -> Result<Option<String>, StoreError> {
    store.get(&address_key(address)).await
}

/// Delete a session. Returns the removed session, or `None` if it did not exist.
///
/// The address index is cleared only while it still points at this token.
pub async fn delete_session(
    store: &dyn KvStore,
    token: &str,
) -> Result<Option<StoredSession>, StoreError> {
    let session: Option<StoredSession> = take_json(store, &session_key(token)).await?;

    if let Some(session) = &session {
        let key = address_key(&session.address);
        if store.get(&key).await?.as_deref() == Some(token) {
            store.delete(&key).await?;
        }
    }

    Ok(session)
}
