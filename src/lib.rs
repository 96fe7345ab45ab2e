pub mod auth;
pub mod config;
pub mod discord;
pub mod error;
pub mod json;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod siwe;
pub mod storage;
pub mod time;
pub mod wallet;

use auth::{AppState, AuthService};
use config::Config;
use discord::DiscordClient;
use error::AppError;
use std::sync::Arc;
use storage::KvStore;
use time::TimeSource;

/// Wire the shared handler state from a store, configuration and clock.
pub fn build_state(
    store: Arc<dyn KvStore>,
    config: Config,
    time_source: Arc<dyn TimeSource>,
) -> Result<AppState, AppError> {
    let discord = DiscordClient::from_config(&config)?;
    let config = Arc::new(config);
    Ok(AppState {
        auth: AuthService::new(store, config.clone(), time_source),
        discord,
        config,
    })
}
