//! Token and nonce generation for authentication.

use base64::{engine::general_purpose, Engine as _};
use rand::{distr::Alphanumeric, Rng};

/// Length of issued sign-in nonces. EIP-4361 requires at least 8.
pub const NONCE_LEN: usize = 32;

/// Generate a cryptographically random session token.
///
/// Returns a base64-encoded string (44 characters) from 32 random bytes.
pub fn generate_session_token() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    general_purpose::STANDARD.encode(bytes)
}

/// Generate a sign-in nonce.
///
/// Alphanumeric only, since the nonce is embedded verbatim in the message text.
pub fn generate_nonce() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}
