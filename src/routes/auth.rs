//! Auth API endpoints.

use crate::auth::middleware::{check_rate_limit, client_ip, AppState, AuthSession};
use crate::auth::service::parse_address;
use crate::error::AppError;
use crate::models::{
    MessageRequest, MessageResponse, NonceResponse, SignOutRequest, SuccessResponse,
    VerifyRequest, VerifyResponse,
};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

/// Apply the per-IP nonce issuance limit shared by every endpoint that
/// stores a nonce.
async fn limit_nonce_issuance(
    state: &AppState,
    headers: &HeaderMap,
    peer: SocketAddr,
    endpoint: &'static str,
) -> Result<(), AppError> {
    let ip = client_ip(headers, peer, state.config.trusted_proxy_count);

    let rate_limit_key = format!("ratelimit:nonce:{}", ip);
    let allowed = check_rate_limit(
        state.store(),
        &rate_limit_key,
        state.config.rate_limit_nonce_per_min,
        60,
    )
    .await?;

    if !allowed {
        let mut hasher = std::hash::DefaultHasher::new();
        ip.hash(&mut hasher);
        let ip_hash = format!("{:x}", hasher.finish());
        tracing::warn!(action = "rate_limited", endpoint, ip_hash = %ip_hash, "Rate limit exceeded");
        return Err(AppError::RateLimited);
    }

    Ok(())
}

/// GET /api/auth/nonce: Issue a single-use sign-in nonce
pub async fn issue_nonce(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    limit_nonce_issuance(&state, &headers, addr, "auth/nonce").await?;

    let nonce = state.auth.issue_nonce().await?;
    Ok(Json(NonceResponse { nonce }))
}

/// POST /api/auth/message: Issue a nonce and build the message to sign
pub async fn prepare_message(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<MessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    limit_nonce_issuance(&state, &headers, addr, "auth/message").await?;

    let message = state
        .auth
        .prepare_message(&req.address, req.chain_id)
        .await?;

    Ok(Json(MessageResponse {
        nonce: message.nonce().to_string(),
        message: message.to_string(),
    }))
}

/// POST /api/auth/verify: Verify a signed message and create a session
///
/// Rejected attempts answer `{"success": false}` with status 200.
pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.auth.sign_in(&req.message, &req.signature).await?;

    Ok(Json(VerifyResponse {
        success: session.is_some(),
        token: session.map(|s| s.token),
    }))
}

/// GET /api/auth/session: Current session for the bearer token
pub async fn session(session: AuthSession) -> Json<crate::models::SessionResponse> {
    Json(session.session)
}

/// POST /api/auth/signout: Destroy the session and linked account cache
///
/// Both the bearer token and the `{"address": ...}` body are optional, and
/// repeating the call is harmless.
pub async fn sign_out(
    State(state): State<AppState>,
    session: Option<AuthSession>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let req: SignOutRequest = if body.is_empty() {
        SignOutRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))?
    };

    let address = req.address.as_deref().map(parse_address).transpose()?;
    let token = session.as_ref().map(|s| s.token.as_str());

    state.auth.sign_out(token, address).await?;

    Ok(Json(SuccessResponse { success: true }))
}
