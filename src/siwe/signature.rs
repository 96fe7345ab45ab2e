//! EIP-191 `personal_sign` signatures over secp256k1.

use super::address::{keccak256, Address};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature is not valid hex")]
    InvalidHex,
    #[error("invalid signature length: expected 65 bytes, got {0}")]
    InvalidLength(usize),
    #[error("invalid recovery byte: {0}")]
    InvalidRecoveryId(u8),
    #[error("malformed signature")]
    Malformed,
    #[error("public key recovery failed")]
    RecoveryFailed,
}

/// Hash of a message under the EIP-191 personal message prefix.
pub fn eip191_hash(message: &[u8]) -> [u8; 32] {
    let mut prefixed = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    prefixed.extend_from_slice(message);
    keccak256(&prefixed)
}

/// Recover the signing address from a hex `r || s || v` signature.
pub fn recover_address(message: &[u8], signature_hex: &str) -> Result<Address, SignatureError> {
    let digits = signature_hex.strip_prefix("0x").unwrap_or(signature_hex);
    let bytes = hex::decode(digits).map_err(|_| SignatureError::InvalidHex)?;
    if bytes.len() != 65 {
        return Err(SignatureError::InvalidLength(bytes.len()));
    }

    // Wallets emit v as 27/28; some libraries use 0/1
    let v = bytes[64];
    let parity = match v {
        27 | 28 => v - 27,
        0 | 1 => v,
        _ => return Err(SignatureError::InvalidRecoveryId(v)),
    };

    let mut signature = Signature::from_slice(&bytes[..64]).map_err(|_| SignatureError::Malformed)?;
    let mut is_y_odd = parity == 1;
    // High-s signatures recover with the flipped parity after normalization
    if let Some(normalized) = signature.normalize_s() {
        signature = normalized;
        is_y_odd = !is_y_odd;
    }
    let recovery_id = RecoveryId::new(is_y_odd, false);

    let hash = eip191_hash(message);
    let key = VerifyingKey::recover_from_prehash(&hash, &signature, recovery_id)
        .map_err(|_| SignatureError::RecoveryFailed)?;

    let point = key.to_encoded_point(false);
    Ok(Address::from_public_key(&point.as_bytes()[1..]))
}

/// Whether `signature_hex` is a valid signature of `message` by `address`.
///
/// Malformed signatures are treated as invalid rather than as errors.
pub fn verify_signature(address: &Address, message: &[u8], signature_hex: &str) -> bool {
    match recover_address(message, signature_hex) {
        Ok(recovered) => recovered == *address,
        Err(e) => {
            tracing::debug!(error = %e, "Signature rejected");
            false
        }
    }
}

/// Address controlled by a signing key.
pub fn address_of(key: &SigningKey) -> Address {
    let point = key.verifying_key().to_encoded_point(false);
    Address::from_public_key(&point.as_bytes()[1..])
}

/// Produce a wallet-style `personal_sign` signature (hex, `v` = 27/28).
pub fn sign_message(key: &SigningKey, message: &[u8]) -> Result<String, SignatureError> {
    let hash = eip191_hash(message);
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(&hash)
        .map_err(|_| SignatureError::Malformed)?;

    let mut bytes = signature.to_bytes().to_vec();
    bytes.push(27 + recovery_id.to_byte());
    Ok(format!("0x{}", hex::encode(bytes)))
}
