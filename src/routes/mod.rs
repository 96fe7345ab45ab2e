//! API route handlers.

pub mod auth;
pub mod discord;

use crate::auth::middleware::AppState;
use crate::error::AppError;
use crate::siwe::Address;
use axum::{routing::get, routing::post, Router};

/// Require a query parameter, answering `400 Missing {label}` when absent.
pub fn require_param<'a>(value: &'a Option<String>, label: &str) -> Result<&'a str, AppError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("Missing {}", label)))
}

/// Parse a wallet address parameter.
pub fn require_address(value: &Option<String>) -> Result<Address, AppError> {
    crate::auth::service::parse_address(require_param(value, "address")?)
}

async fn health() -> &'static str {
    "ok"
}

/// Build the API router with all endpoints.
pub fn api_router() -> Router<AppState> {
    Router::new()
        // Auth endpoints
        .route("/api/auth/nonce", get(auth::issue_nonce))
        .route("/api/auth/message", post(auth::prepare_message))
        .route("/api/auth/verify", post(auth::verify))
        .route("/api/auth/session", get(auth::session))
        .route("/api/auth/signout", post(auth::sign_out))
        // Discord endpoints
        .route("/api/discord/bot", get(discord::bot))
        .route("/api/discord/login", get(discord::login))
        .route("/api/discord/user", get(discord::user))
        .route("/api/discord/logout", post(discord::logout))
        .route("/health", get(health))
}
