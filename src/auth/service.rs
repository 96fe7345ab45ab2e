//! Sign-in orchestration: nonce issuance, message building, verification,
//! sessions and sign-out.

use super::session::{generate_nonce, generate_session_token};
use super::verifier::{AttemptState, PendingAttempt};
use crate::config::Config;
use crate::error::AppError;
use crate::json::deep_stringify;
use crate::models::{DiscordLink, SessionResponse, StoredNonce, StoredSession};
use crate::siwe::{Address, SiweMessage};
use crate::storage::{self, KvStore};
use crate::time::TimeSource;
use chrono::Duration;
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn KvStore>,
    config: Arc<Config>,
    time_source: Arc<dyn TimeSource>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn KvStore>,
        config: Arc<Config>,
        time_source: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            store,
            config,
            time_source,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &dyn KvStore {
        self.store.as_ref()
    }

    /// Issue a single-use nonce valid for `nonce_ttl_secs`.
    pub async fn issue_nonce(&self) -> Result<String, AppError> {
        let now = self.time_source.now();
        let nonce = StoredNonce {
            nonce: generate_nonce(),
            issued_at: now,
            expires_at: now + Duration::seconds(self.config.nonce_ttl_secs as i64),
        };

        storage::nonce::store_nonce(self.store(), &nonce, self.config.nonce_ttl_secs).await?;

        tracing::debug!(action = "nonce_issued", "Issued sign-in nonce");
        Ok(nonce.nonce)
    }

    /// Build the canonical sign-in message for this server's domain.
    pub fn build_message(
        &self,
        nonce: &str,
        address: &str,
        chain_id: u64,
    ) -> Result<SiweMessage, AppError> {
        let address = parse_address(address)?;
        self.check_chain(chain_id)?;

        SiweMessage::new(
            &self.config.siwe_domain,
            address,
            self.config.siwe_statement.as_deref(),
            &self.config.siwe_uri,
            chain_id,
            nonce,
            self.time_source.now(),
        )
        .map_err(|e| AppError::BadRequest(format!("Invalid message: {}", e)))
    }

    /// Issue a nonce and build the message embedding it.
    pub async fn prepare_message(
        &self,
        address: &str,
        chain_id: u64,
    ) -> Result<SiweMessage, AppError> {
        // Validate before issuing so bad input does not leave nonces behind
        parse_address(address)?;
        self.check_chain(chain_id)?;

        let nonce = self.issue_nonce().await?;
        self.build_message(&nonce, address, chain_id)
    }

    /// Run a submitted message and signature through the verifier.
    ///
    /// Invalid input yields a non-verified state, never an error; errors
    /// mean the store failed.
    pub async fn verify(&self, message: &str, signature: &str) -> Result<AttemptState, AppError> {
        let now = self.time_source.now();

        let attempt = match PendingAttempt::parse(message, signature)
            .and_then(|a| a.check_claims(&self.config, now))
            .and_then(PendingAttempt::check_signature)
        {
            Ok(attempt) => attempt,
            Err(terminal) => return Ok(terminal),
        };

        let stored = storage::nonce::take_nonce(self.store(), attempt.message().nonce()).await?;
        Ok(attempt.consume_nonce(stored, now))
    }

    /// Verify and, on success, create the session.
    pub async fn sign_in(
        &self,
        message: &str,
        signature: &str,
    ) -> Result<Option<StoredSession>, AppError> {
        match self.verify(message, signature).await? {
            AttemptState::Verified(identity) => {
                let session = self
                    .create_session(identity.address, identity.chain_id)
                    .await?;
                Ok(Some(session))
            }
            AttemptState::Expired => {
                tracing::warn!(action = "auth_failed", reason = "expired", "Sign-in rejected");
                Ok(None)
            }
            AttemptState::Rejected(reason) => {
                tracing::warn!(action = "auth_failed", reason = %reason, "Sign-in rejected");
                Ok(None)
            }
        }
    }

    /// Create a session for `address`, replacing its previous one.
    pub async fn create_session(
        &self,
        address: Address,
        chain_id: u64,
    ) -> Result<StoredSession, AppError> {
        if let Some(previous) =
            storage::session::get_session_token_for_address(self.store(), &address).await?
        {
            storage::session::delete_session(self.store(), &previous).await?;
        }

        let now = self.time_source.now();
        let session = StoredSession {
            token: generate_session_token(),
            address,
            chain_id,
            authenticated_at: now,
            expires_at: now + Duration::seconds(self.config.session_ttl_secs as i64),
        };

        storage::session::store_session(self.store(), &session, self.config.session_ttl_secs)
            .await?;

        tracing::info!(action = "auth_success", address = %address, chain_id, "Wallet signed in");
        Ok(session)
    }

    /// Look up a session, filling in linked external identities.
    pub async fn get_session(&self, token: &str) -> Result<Option<SessionResponse>, AppError> {
        let Some(session) = storage::session::get_session(self.store(), token).await? else {
            return Ok(None);
        };

        let discord = self.discord_user(&session.address).await?;

        Ok(Some(SessionResponse {
            address: session.address,
            chain_id: session.chain_id,
            authenticated_at: session.authenticated_at,
            expires_at: session.expires_at,
            discord,
        }))
    }

    pub async fn destroy_session(&self, token: &str) -> Result<Option<StoredSession>, AppError> {
        Ok(storage::session::delete_session(self.store(), token).await?)
    }

    /// Destroy the session (if any) and the Discord link of its address and
    /// of `address`. Safe to repeat.
    pub async fn sign_out(
        &self,
        token: Option<&str>,
        address: Option<Address>,
    ) -> Result<(), AppError> {
        let mut addresses = Vec::with_capacity(2);

        if let Some(token) = token {
            if let Some(session) = self.destroy_session(token).await? {
                addresses.push(session.address);
            }
        }
        if let Some(address) = address {
            if !addresses.contains(&address) {
                addresses.push(address);
            }
        }

        for address in &addresses {
            storage::discord::delete_link(self.store(), address).await?;
            tracing::info!(action = "sign_out", address = %address, "Signed out");
        }

        Ok(())
    }

    /// Cache a Discord account for `address`. The user object is
    /// deep-stringified before it is stored.
    pub async fn link_discord(
        &self,
        address: Address,
        user: Value,
        access_token: String,
    ) -> Result<DiscordLink, AppError> {
        let link = DiscordLink {
            address,
            user: deep_stringify(user),
            access_token,
            linked_at: self.time_source.now(),
        };

        storage::discord::store_link(self.store(), &link, self.config.discord_link_ttl_secs)
            .await?;

        tracing::info!(action = "discord_linked", address = %address, "Discord account linked");
        Ok(link)
    }

    pub async fn discord_user(&self, address: &Address) -> Result<Option<Value>, AppError> {
        Ok(storage::discord::get_link(self.store(), address)
            .await?
            .map(|link| link.user))
    }

    pub async fn unlink_discord(&self, address: &Address) -> Result<bool, AppError> {
        let removed = storage::discord::delete_link(self.store(), address).await?;
        if removed {
            tracing::info!(action = "discord_unlinked", address = %address, "Discord account unlinked");
        }
        Ok(removed)
    }

    fn check_chain(&self, chain_id: u64) -> Result<(), AppError> {
        if !self.config.is_supported_chain(chain_id) {
            return Err(AppError::BadRequest(format!(
                "Unsupported chain id {}",
                chain_id
            )));
        }
        Ok(())
    }
}

pub fn parse_address(address: &str) -> Result<Address, AppError> {
    address
        .parse()
        .map_err(|e| AppError::BadRequest(format!("Invalid address: {}", e)))
}
