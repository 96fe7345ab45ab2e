//! Request and response models for the API.
//!
//! Storage models represent the JSON kept in the keyed store.

use crate::siwe::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Auth Models
// ============================================================================

/// Response containing a fresh sign-in nonce.
#[derive(Debug, Serialize, Deserialize)]
pub struct NonceResponse {
    pub nonce: String,
}

/// Request for a ready-to-sign message.
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub address: String,
    pub chain_id: u64,
}

/// Response carrying the nonce and canonical message text.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub nonce: String,
    pub message: String,
}

/// Request to verify a signed message.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub message: String,
    pub signature: String,
}

/// Verification result. `token` is present only on success.
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Optional sign-out body.
#[derive(Debug, Default, Deserialize)]
pub struct SignOutRequest {
    pub address: Option<String>,
}

/// Generic `{"success": ...}` body.
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Session as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub address: Address,
    pub chain_id: u64,
    pub authenticated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub discord: Option<serde_json::Value>,
}

// ============================================================================
// Discord Models
// ============================================================================

/// Query parameters shared by the Discord endpoints.
///
/// All fields are optional so handlers can report which one is missing.
#[derive(Debug, Default, Deserialize)]
pub struct DiscordQuery {
    pub address: Option<String>,
    pub command: Option<String>,
    pub code: Option<String>,
}

/// OAuth token grant returned by Discord.
#[derive(Debug, Deserialize)]
pub struct DiscordTokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

// ============================================================================
// Storage Models
// ============================================================================

/// Issued nonce awaiting a signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredNonce {
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Authenticated session as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub address: Address,
    pub chain_id: u64,
    pub authenticated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Discord account linked to a wallet address.
#[derive(Clone, Serialize, Deserialize)]
pub struct DiscordLink {
    pub address: Address,
    /// Discord user object, deep-stringified.
    pub user: serde_json::Value,
    pub access_token: String,
    pub linked_at: DateTime<Utc>,
}

impl std::fmt::Debug for DiscordLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordLink")
            .field("address", &self.address)
            .field("user", &self.user)
            .field("access_token", &"[REDACTED]")
            .field("linked_at", &self.linked_at)
            .finish()
    }
}
