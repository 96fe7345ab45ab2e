//! Discord API endpoints.

use super::{require_address, require_param};
use crate::auth::middleware::AppState;
use crate::error::AppError;
use crate::models::{DiscordQuery, SuccessResponse};
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};

/// GET /api/discord/bot: Forward a bot request to the Discord API
///
/// Returns the upstream status and JSON body as-is.
pub async fn bot(
    State(state): State<AppState>,
    Query(query): Query<DiscordQuery>,
) -> Result<impl IntoResponse, AppError> {
    let address = require_param(&query.address, "address")?;
    let command = require_param(&query.command, "command")?;
    if !state.discord.has_bot_token() {
        return Err(AppError::BadRequest("Missing bot token".to_string()));
    }

    let (status, body) = state.discord.bot_request(command).await?;

    tracing::debug!(action = "discord_bot", address = %address, command = %command, status = status.as_u16(), "Proxied bot request");

    Ok((status, Json(body)))
}

/// GET /api/discord/login: Complete the OAuth flow and link the account
pub async fn login(
    State(state): State<AppState>,
    Query(query): Query<DiscordQuery>,
) -> Result<impl IntoResponse, AppError> {
    let address = require_address(&query.address)?;
    let code = require_param(&query.code, "code")?;

    let grant = state.discord.exchange_code(code).await?;
    let user = state.discord.fetch_current_user(&grant.access_token).await?;

    let link = state
        .auth
        .link_discord(address, user, grant.access_token)
        .await?;

    Ok(Json(link.user))
}

/// GET /api/discord/user: Linked Discord user for an address, or `null`
pub async fn user(
    State(state): State<AppState>,
    Query(query): Query<DiscordQuery>,
) -> Result<impl IntoResponse, AppError> {
    let address = require_address(&query.address)?;
    let user = state.auth.discord_user(&address).await?;
    Ok(Json(user))
}

/// POST /api/discord/logout: Remove the cached link for an address
pub async fn logout(
    State(state): State<AppState>,
    Query(query): Query<DiscordQuery>,
) -> Result<impl IntoResponse, AppError> {
    let address = require_address(&query.address)?;
    state.auth.unlink_discord(&address).await?;
    Ok(Json(SuccessResponse { success: true }))
}
