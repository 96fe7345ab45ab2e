//! Sign-in attempt state machine.
//!
//! ```text
//! Pending ──check_claims──▶ Pending ──check_signature──▶ Pending ──consume_nonce──▶ Verified
//!    │                        │                            │
//!    └──────────────▶ Rejected / Expired ◀─────────────────┘
//! ```
//!
//! Each transition consumes the pending attempt and either hands it on or
//! ends in a terminal state. The nonce is consumed last, so an attempt with a
//! bad signature leaves the nonce usable.

use crate::config::Config;
use crate::models::StoredNonce;
use crate::siwe::{verify_signature, Address, SiweMessage};
use chrono::{DateTime, Utc};
use std::fmt;

/// Why an attempt was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    MalformedMessage(String),
    DomainMismatch,
    UnsupportedChain(u64),
    NotYetValid,
    BadSignature,
    /// Never issued, already consumed, or evicted from the store.
    UnknownNonce,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MalformedMessage(e) => write!(f, "malformed message: {}", e),
            RejectReason::DomainMismatch => f.write_str("domain mismatch"),
            RejectReason::UnsupportedChain(id) => write!(f, "unsupported chain {}", id),
            RejectReason::NotYetValid => f.write_str("message not yet valid"),
            RejectReason::BadSignature => f.write_str("bad signature"),
            RejectReason::UnknownNonce => f.write_str("unknown or reused nonce"),
        }
    }
}

/// Identity proven by a verified attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub address: Address,
    pub chain_id: u64,
}

/// Outcome of a sign-in attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    Verified(VerifiedIdentity),
    Expired,
    Rejected(RejectReason),
}

impl AttemptState {
    pub fn is_verified(&self) -> bool {
        matches!(self, AttemptState::Verified(_))
    }
}

/// A submitted message and signature that have not reached a terminal state.
#[derive(Debug)]
pub struct PendingAttempt {
    message: SiweMessage,
    signature: String,
}

impl PendingAttempt {
    pub fn parse(message: &str, signature: &str) -> Result<Self, AttemptState> {
        let message = message.parse::<SiweMessage>().map_err(|e| {
            AttemptState::Rejected(RejectReason::MalformedMessage(e.to_string()))
        })?;
        Ok(Self::new(message, signature))
    }

    pub fn new(message: SiweMessage, signature: &str) -> Self {
        Self {
            message,
            signature: signature.to_string(),
        }
    }

    pub fn message(&self) -> &SiweMessage {
        &self.message
    }

    /// Check the message against this server's domain, chains and the clock.
    pub fn check_claims(self, config: &Config, now: DateTime<Utc>) -> Result<Self, AttemptState> {
        if self.message.domain() != config.siwe_domain {
            return Err(AttemptState::Rejected(RejectReason::DomainMismatch));
        }
        if !config.is_supported_chain(self.message.chain_id()) {
            return Err(AttemptState::Rejected(RejectReason::UnsupportedChain(
                self.message.chain_id(),
            )));
        }
        if self.message.expiration_time().is_some_and(|t| t <= now) {
            return Err(AttemptState::Expired);
        }
        if self.message.not_before().is_some_and(|t| t > now) {
            return Err(AttemptState::Rejected(RejectReason::NotYetValid));
        }
        Ok(self)
    }

    /// Recover the signer over the canonical text and compare to the claimed address.
    pub fn check_signature(self) -> Result<Self, AttemptState> {
        let canonical = self.message.to_string();
        if !verify_signature(&self.message.address(), canonical.as_bytes(), &self.signature) {
            return Err(AttemptState::Rejected(RejectReason::BadSignature));
        }
        Ok(self)
    }

    /// Final transition, given the result of atomically taking the nonce record.
    pub fn consume_nonce(self, stored: Option<StoredNonce>, now: DateTime<Utc>) -> AttemptState {
        match stored {
            None => AttemptState::Rejected(RejectReason::UnknownNonce),
            Some(nonce) if nonce.expires_at <= now => AttemptState::Expired,
            Some(_) => AttemptState::Verified(VerifiedIdentity {
                address: self.message.address(),
                chain_id: self.message.chain_id(),
            }),
        }
    }
}
