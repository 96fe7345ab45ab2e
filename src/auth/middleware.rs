//! Axum extractors for authentication and rate limiting.

use super::service::AuthService;
use crate::config::Config;
use crate::discord::DiscordClient;
use crate::error::AppError;
use crate::storage::{KvStore, StoreError};
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub discord: DiscordClient,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn store(&self) -> &dyn KvStore {
        self.auth.store()
    }
}

/// Authenticated session extractor.
///
/// Extracts session from `Authorization: Bearer {token}` header.
/// Returns 401 Unauthorized if missing or invalid.
pub struct AuthSession {
    pub token: String,
    pub session: crate::models::SessionResponse,
}

fn bearer_token(parts: &Parts) -> Result<String, AppError> {
    let auth_header = parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".to_string()))?;

    Ok(auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization format".to_string()))?
        .to_string())
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;

        let session = state
            .auth
            .get_session(&token)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid or expired session".to_string()))?;

        Ok(AuthSession { token, session })
    }
}

/// Optional authenticated session extractor.
///
/// Returns Some(AuthSession) if valid auth header present, None otherwise.
/// Store failures still fail the request.
impl OptionalFromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        match <AuthSession as FromRequestParts<AppState>>::from_request_parts(parts, state).await {
            Ok(session) => Ok(Some(session)),
            Err(AppError::Unauthorized(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Check a fixed-window rate limit.
///
/// # Returns
/// * `Ok(true)` if under limit
/// * `Ok(false)` if limit exceeded
pub async fn check_rate_limit(
    store: &dyn KvStore,
    key: &str,
    max: u32,
    window_secs: u64,
) -> Result<bool, StoreError> {
    let count = store.incr_with_ttl(key, window_secs).await?;
    Ok(count <= u64::from(max))
}

/// Resolve the client IP, trusting `X-Forwarded-For` only for the
/// configured number of proxy hops.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr, trusted_proxy_count: usize) -> IpAddr {
    if trusted_proxy_count == 0 {
        return peer.ip();
    }

    let forwarded: Vec<IpAddr> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    // Each trusted proxy appends the address it saw; the client is the
    // entry the outermost trusted proxy added.
    forwarded
        .len()
        .checked_sub(trusted_proxy_count)
        .and_then(|i| forwarded.get(i).copied())
        .unwrap_or_else(|| peer.ip())
}
