//! Discord link cache.
//!
//! Key pattern: `discord:{address}`: linked Discord account (JSON)

use super::{get_json, set_json, KvStore, StoreError};
use crate::models::DiscordLink;
use crate::siwe::Address;

fn link_key(address: &Address) -> String {
    format!("discord:{}", address.to_lowercase_hex())
}

pub async fn store_link(
    store: &dyn KvStore,
    link: &DiscordLink,
    ttl_secs: u64,
) -> Result<(), StoreError> {
    set_json(store, &link_key(&link.address), link, ttl_secs).await
}

pub async fn get_link(
    store: &dyn KvStore,
    address: &Address,
) -> Result<Option<DiscordLink>, StoreError> {
    get_json(store, &link_key(address)).await
}

/// Returns true if a link was removed.
pub async fn delete_link(store: &dyn KvStore, address: &Address) -> Result<bool, StoreError> {
    store.delete(&link_key(address)).await
}
