//! Keeps a held session consistent with the wallet connection.
//!
//! The wallet side publishes its status on a `watch` channel. When the
//! wallet disconnects, or switches to a different account, while a session
//! is held, [`SessionSync`] signs that session out.

use crate::auth::AuthService;
use crate::error::AppError;
use crate::models::StoredSession;
use crate::siwe::Address;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletStatus {
    Disconnected,
    Connected(Address),
}

/// The session currently held by the client, shared with the observer.
#[derive(Clone, Default)]
pub struct SessionSlot(Arc<Mutex<Option<StoredSession>>>);

impl SessionSlot {
    pub fn set(&self, session: StoredSession) {
        *self.lock() = Some(session);
    }

    pub fn take(&self) -> Option<StoredSession> {
        self.lock().take()
    }

    /// Put a session back unless another one was set in the meantime.
    pub fn restore(&self, session: StoredSession) {
        self.lock().get_or_insert(session);
    }

    pub fn current(&self) -> Option<StoredSession> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<StoredSession>> {
        // A poisoned slot still holds a valid Option
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct SessionSync {
    auth: AuthService,
    wallet: watch::Receiver<WalletStatus>,
    slot: SessionSlot,
}

impl SessionSync {
    pub fn new(
        auth: AuthService,
        wallet: watch::Receiver<WalletStatus>,
        slot: SessionSlot,
    ) -> Self {
        Self { auth, wallet, slot }
    }

    /// Sign out if `status` no longer matches the held session.
    ///
    /// Returns true if a sign-out was issued.
    pub async fn reconcile(&self, status: &WalletStatus) -> Result<bool, AppError> {
        let stale = match (self.slot.current(), status) {
            (None, _) => false,
            (Some(_), WalletStatus::Disconnected) => true,
            (Some(session), WalletStatus::Connected(address)) => session.address != *address,
        };
        if !stale {
            return Ok(false);
        }

        let Some(session) = self.slot.take() else {
            return Ok(false);
        };
        if let Err(e) = self
            .auth
            .sign_out(Some(&session.token), Some(session.address))
            .await
        {
            // Keep the session held so the next wallet change retries
            self.slot.restore(session);
            return Err(e);
        }

        tracing::info!(action = "wallet_sign_out", address = %session.address, "Wallet no longer matches session");
        Ok(true)
    }

    /// Follow wallet status changes until the sender is dropped.
    pub async fn run(mut self) {
        let initial = self.wallet.borrow_and_update().clone();
        self.reconcile_logged(&initial).await;

        while self.wallet.changed().await.is_ok() {
            let status = self.wallet.borrow_and_update().clone();
            self.reconcile_logged(&status).await;
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn reconcile_logged(&self, status: &WalletStatus) {
        if let Err(e) = self.reconcile(status).await {
            tracing::warn!(action = "wallet_sign_out", error = %e, "Sign-out after wallet change failed");
        }
    }
}
