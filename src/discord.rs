//! Discord REST client: bot proxy and OAuth account linking.

use crate::config::Config;
use crate::error::AppError;
use crate::models::DiscordTokenResponse;
use axum::http::StatusCode;
use serde_json::Value;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct DiscordClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<String>,
}

impl DiscordClient {
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: config.discord_api_base.clone(),
            bot_token: config.discord_bot_token.clone(),
            client_id: config.discord_client_id.clone(),
            client_secret: config.discord_client_secret.clone(),
            redirect_uri: config.discord_redirect_uri.clone(),
        })
    }

    pub fn has_bot_token(&self) -> bool {
        self.bot_token.is_some()
    }

    /// Forward `GET {api_base}/{command}` as the bot. Returns the upstream
    /// status and JSON body unchanged.
    pub async fn bot_request(&self, command: &str) -> Result<(StatusCode, Value), AppError> {
        let token = self
            .bot_token
            .as_deref()
            .ok_or_else(|| AppError::BadRequest("Missing bot token".to_string()))?;

        let url = self.command_url(command)?;

        let response = self
            .http
            .get(url)
            .header("Authorization", format!("Bot {}", token))
            .send()
            .await?;

        let status = response.status();
        let body = response.json::<Value>().await?;
        Ok((status, body))
    }

    /// Resolve `command` against the API base. The resolved path must stay
    /// under the base path once dot segments (plain or percent-encoded) are
    /// normalised.
    fn command_url(&self, command: &str) -> Result<Url, AppError> {
        let invalid = || AppError::BadRequest("Invalid command".to_string());

        let path = command.trim_start_matches('/');
        let lowered = path.to_ascii_lowercase();
        // Encoded separators survive normalisation and are decoded by some servers
        if path.is_empty() || lowered.contains("%2f") || lowered.contains("%5c") {
            return Err(invalid());
        }

        let base = Url::parse(&self.api_base)
            .map_err(|e| AppError::Internal(format!("Invalid Discord API base: {}", e)))?;
        let url = Url::parse(&format!("{}/{}", self.api_base, path)).map_err(|_| invalid())?;

        let prefix = format!("{}/", base.path().trim_end_matches('/'));
        if url.origin() != base.origin() || !url.path().starts_with(&prefix) {
            return Err(invalid());
        }
        Ok(url)
    }

    /// Exchange an OAuth authorization code for a user access token.
    pub async fn exchange_code(&self, code: &str) -> Result<DiscordTokenResponse, AppError> {
        let (Some(client_id), Some(client_secret), Some(redirect_uri)) = (
            self.client_id.as_deref(),
            self.client_secret.as_deref(),
            self.redirect_uri.as_deref(),
        ) else {
            return Err(AppError::BadRequest(
                "Missing Discord OAuth configuration".to_string(),
            ));
        };

        let response = self
            .http
            .post(format!("{}/oauth2/token", self.api_base))
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "Token exchange returned {}",
                response.status()
            )));
        }

        Ok(response.json::<DiscordTokenResponse>().await?)
    }

    /// Fetch the user owning `access_token`.
    pub async fn fetch_current_user(&self, access_token: &str) -> Result<Value, AppError> {
        let response = self
            .http
            .get(format!("{}/users/@me", self.api_base))
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "User lookup returned {}",
                response.status()
            )));
        }

        Ok(response.json::<Value>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> DiscordClient {
        let mut config = Config::for_domain("app.nance.xyz");
        config.discord_api_base = server.uri();
        config.discord_bot_token = Some("bot-token".to_string());
        config.discord_client_id = Some("client".to_string());
        config.discord_client_secret = Some("secret".to_string());
        config.discord_redirect_uri = Some("https://app.nance.xyz/discord".to_string());
        DiscordClient::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn test_bot_request_forwards_with_bot_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/guilds/123/channels"))
            .and(header("Authorization", "Bot bot-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "1" }])))
            .expect(1)
            .mount(&server)
            .await;

        let (status, body) = client(&server)
            .bot_request("guilds/123/channels")
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([{ "id": "1" }]));
    }

    #[tokio::test]
    async fn test_bot_request_passes_upstream_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/guilds/404"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "message": "Unknown Guild" })),
            )
            .mount(&server)
            .await;

        let (status, body) = client(&server).bot_request("/guilds/404").await.unwrap();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Unknown Guild");
    }

    #[tokio::test]
    async fn test_bot_request_without_token() {
        let mut config = Config::for_domain("app.nance.xyz");
        config.discord_bot_token = None;
        let client = DiscordClient::from_config(&config).unwrap();

        let err = client.bot_request("users/@me").await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m == "Missing bot token"));
    }

    #[tokio::test]
    async fn test_bot_request_rejects_traversal() {
        let server = MockServer::start().await;
        let mut config = Config::for_domain("app.nance.xyz");
        config.discord_api_base = format!("{}/api/v10", server.uri());
        config.discord_bot_token = Some("bot-token".to_string());
        let client = DiscordClient::from_config(&config).unwrap();

        Mock::given(method("GET"))
            .and(path("/secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "leaked": true })))
            .expect(0)
            .mount(&server)
            .await;

        for command in [
            "../oauth2",
            "%2e%2e/%2e%2e/secret",
            "%2E%2E/%2e%2E/secret",
            "guilds/..%2f..%2f../secret",
            ".%2e/.%2e/secret",
            "/",
        ] {
            let err = client.bot_request(command).await.unwrap_err();
            assert!(
                matches!(err, AppError::BadRequest(_)),
                "command {:?} was not rejected",
                command
            );
        }
    }

    #[tokio::test]
    async fn test_bot_request_under_base_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v10/guilds/1/channels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = Config::for_domain("app.nance.xyz");
        config.discord_api_base = format!("{}/api/v10", server.uri());
        config.discord_bot_token = Some("bot-token".to_string());
        let client = DiscordClient::from_config(&config).unwrap();

        let (status, _) = client.bot_request("guilds/1/channels").await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_exchange_code_and_fetch_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("code=the-code"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "user-token",
                "token_type": "Bearer",
                "expires_in": 604800
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/@me"))
            .and(header("Authorization", "Bearer user-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": "80351110224678912", "username": "nance" })),
            )
            .mount(&server)
            .await;

        let client = client(&server);
        let token = client.exchange_code("the-code").await.unwrap();
        assert_eq!(token.access_token, "user-token");

        let user = client.fetch_current_user(&token.access_token).await.unwrap();
        assert_eq!(user["username"], "nance");
    }

    #[tokio::test]
    async fn test_exchange_code_failure_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })),
            )
            .mount(&server)
            .await;

        let err = client(&server).exchange_code("bad").await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }
}
