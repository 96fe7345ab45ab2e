//! Integration tests for the nance-auth API.
//!
//! Each test runs the router on an ephemeral port with a fresh in-memory
//! store. The Discord API is replaced by a wiremock server.

use k256::ecdsa::SigningKey;
use nance_auth::{
    build_state, config::Config, middleware::security_headers, routes,
    siwe::signature::{address_of, sign_message},
    storage::MemoryStore,
    time::SystemTimeSource,
};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DOMAIN: &str = "app.nance.xyz";

fn test_config() -> Config {
    Config::for_domain(DOMAIN)
}

/// Config pointing the Discord client at a mock server.
fn discord_config(server: &MockServer) -> Config {
    let mut config = test_config();
    config.discord_api_base = server.uri();
    config.discord_bot_token = Some("bot-token".to_string());
    config.discord_client_id = Some("client".to_string());
    config.discord_client_secret = Some("secret".to_string());
    config.discord_redirect_uri = Some(format!("https://{}/discord", DOMAIN));
    config
}

/// Spin up a test server and return its base URL.
async fn spawn_test_server(config: Config) -> String {
    let state = build_state(
        Arc::new(MemoryStore::new()),
        config,
        Arc::new(SystemTimeSource),
    )
    .expect("Failed to build state");

    let app = routes::api_router()
        .layer(axum::middleware::from_fn(security_headers))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .await
        .unwrap();
    });

    format!("http://{}", addr)
}

fn wallet(seed: u8) -> SigningKey {
    SigningKey::from_slice(&[seed; 32]).unwrap()
}

/// Helper: fetch a message for `key`, sign it, and return (message, signature).
async fn signed_message(
    client: &reqwest::Client,
    base_url: &str,
    key: &SigningKey,
) -> (String, String) {
    let res = client
        .post(format!("{}/api/auth/message", base_url))
        .json(&json!({ "address": address_of(key).to_checksum(), "chain_id": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let body: Value = res.json().await.unwrap();
    let message = body["message"].as_str().unwrap().to_string();
    assert!(message.contains(&format!("Nonce: {}", body["nonce"].as_str().unwrap())));

    let signature = sign_message(key, message.as_bytes()).unwrap();
    (message, signature)
}

async fn verify(
    client: &reqwest::Client,
    base_url: &str,
    message: &str,
    signature: &str,
) -> Value {
    let res = client
        .post(format!("{}/api/auth/verify", base_url))
        .json(&json!({ "message": message, "signature": signature }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    res.json().await.unwrap()
}

/// Helper: complete a sign-in and return the session token.
async fn sign_in(client: &reqwest::Client, base_url: &str, key: &SigningKey) -> String {
    let (message, signature) = signed_message(client, base_url, key).await;
    let body = verify(client, base_url, &message, &signature).await;
    assert_eq!(body["success"], true);
    body["token"].as_str().unwrap().to_string()
}

// ============================================================================
// Auth
// ============================================================================

#[tokio::test]
async fn test_health() {
    let base_url = spawn_test_server(test_config()).await;
    let res = reqwest::get(format!("{}/health", base_url)).await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_nonce_endpoint() {
    let base_url = spawn_test_server(test_config()).await;
    let res = reqwest::get(format!("{}/api/auth/nonce", base_url))
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers().get("cache-control").unwrap(), "no-store");

    let body: Value = res.json().await.unwrap();
    let nonce = body["nonce"].as_str().unwrap();
    assert_eq!(nonce.len(), 32);
    assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
}

#[tokio::test]
async fn test_nonce_rate_limit() {
    let mut config = test_config();
    config.rate_limit_nonce_per_min = 2;
    let base_url = spawn_test_server(config).await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let res = client
            .get(format!("{}/api/auth/nonce", base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
    }

    let res = client
        .get(format!("{}/api/auth/nonce", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 429);
}

#[tokio::test]
async fn test_message_endpoint_shares_nonce_rate_limit() {
    let mut config = test_config();
    config.rate_limit_nonce_per_min = 2;
    let base_url = spawn_test_server(config).await;
    let client = reqwest::Client::new();
    let body = json!({ "address": address_of(&wallet(7)).to_checksum(), "chain_id": 1 });

    let res = client
        .get(format!("{}/api/auth/nonce", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let res = client
        .post(format!("{}/api/auth/message", base_url))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    // Both endpoints draw from the same per-IP budget
    for _ in 0..5 {
        let res = client
            .post(format!("{}/api/auth/message", base_url))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 429);
    }
}

#[tokio::test]
async fn test_sign_in_flow_and_replay() {
    let base_url = spawn_test_server(test_config()).await;
    let client = reqwest::Client::new();
    let key = wallet(7);

    let (message, signature) = signed_message(&client, &base_url, &key).await;

    let body = verify(&client, &base_url, &message, &signature).await;
    assert_eq!(body["success"], true);
    let token = body["token"].as_str().unwrap();

    // Session is readable with the bearer token
    let res = client
        .get(format!("{}/api/auth/session", base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let session: Value = res.json().await.unwrap();
    assert_eq!(session["address"], address_of(&key).to_checksum());
    assert_eq!(session["chain_id"], 1);
    assert_eq!(session["discord"], Value::Null);

    // Replaying the same message and signature fails
    let body = verify(&client, &base_url, &message, &signature).await;
    assert_eq!(body["success"], false);
    assert!(body.get("token").is_none());
}

#[tokio::test]
async fn test_verify_with_other_key_fails() {
    let base_url = spawn_test_server(test_config()).await;
    let client = reqwest::Client::new();

    let (message, _) = signed_message(&client, &base_url, &wallet(7)).await;
    let forged = sign_message(&wallet(8), message.as_bytes()).unwrap();

    let body = verify(&client, &base_url, &message, &forged).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_verify_malformed_input() {
    let base_url = spawn_test_server(test_config()).await;
    let client = reqwest::Client::new();

    let body = verify(&client, &base_url, "hello", "0xdeadbeef").await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_message_rejects_bad_input() {
    let base_url = spawn_test_server(test_config()).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/auth/message", base_url))
        .json(&json!({ "address": "0x1234", "chain_id": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    let res = client
        .post(format!("{}/api/auth/message", base_url))
        .json(&json!({ "address": address_of(&wallet(7)).to_checksum(), "chain_id": 56 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    assert!(res.text().await.unwrap().contains("Unsupported chain"));
}

#[tokio::test]
async fn test_session_requires_token() {
    let base_url = spawn_test_server(test_config()).await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/api/auth/session", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let res = client
        .get(format!("{}/api/auth/session", base_url))
        .bearer_auth("not-a-session")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
}

#[tokio::test]
async fn test_sign_out_is_idempotent() {
    let base_url = spawn_test_server(test_config()).await;
    let client = reqwest::Client::new();
    let key = wallet(7);
    let token = sign_in(&client, &base_url, &key).await;

    for _ in 0..2 {
        let res = client
            .post(format!("{}/api/auth/signout", base_url))
            .bearer_auth(&token)
            .json(&json!({ "address": address_of(&key).to_checksum() }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body, json!({ "success": true }));
    }

    let res = client
        .get(format!("{}/api/auth/session", base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
}

#[tokio::test]
async fn test_sign_out_without_body_or_token() {
    let base_url = spawn_test_server(test_config()).await;
    let res = reqwest::Client::new()
        .post(format!("{}/api/auth/signout", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
}

// ============================================================================
// Discord
// ============================================================================

#[tokio::test]
async fn test_bot_missing_parameters() {
    let server = MockServer::start().await;
    let base_url = spawn_test_server(discord_config(&server)).await;
    let client = reqwest::Client::new();
    let address = address_of(&wallet(7)).to_checksum();

    let res = client
        .get(format!("{}/api/discord/bot", base_url))
        .query(&[("address", address.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    assert_eq!(res.text().await.unwrap(), "Missing command");

    let res = client
        .get(format!("{}/api/discord/bot", base_url))
        .query(&[("command", "users/@me")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    assert_eq!(res.text().await.unwrap(), "Missing address");
}

#[tokio::test]
async fn test_bot_missing_token() {
    let base_url = spawn_test_server(test_config()).await;
    let address = address_of(&wallet(7)).to_checksum();

    let res = reqwest::Client::new()
        .get(format!("{}/api/discord/bot", base_url))
        .query(&[("address", address.as_str()), ("command", "users/@me")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    assert_eq!(res.text().await.unwrap(), "Missing bot token");
}

#[tokio::test]
async fn test_bot_proxy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/guilds/42/roles"))
        .and(header("Authorization", "Bot bot-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "id": "1", "name": "admin" }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let base_url = spawn_test_server(discord_config(&server)).await;
    let address = address_of(&wallet(7)).to_checksum();

    let res = reqwest::Client::new()
        .get(format!("{}/api/discord/bot", base_url))
        .query(&[("address", address.as_str()), ("command", "guilds/42/roles")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!([{ "id": "1", "name": "admin" }]));
}

#[tokio::test]
async fn test_discord_link_lifecycle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
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
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 80351110224678912u64,
            "username": "nance",
            "mfa_enabled": true,
            "avatar": null
        })))
        .mount(&server)
        .await;

    let base_url = spawn_test_server(discord_config(&server)).await;
    let client = reqwest::Client::new();
    let key = wallet(7);
    let address = address_of(&key).to_checksum();
    let token = sign_in(&client, &base_url, &key).await;

    let expected = json!({
        "id": "80351110224678912",
        "username": "nance",
        "mfa_enabled": "true",
        "avatar": null
    });

    let res = client
        .get(format!("{}/api/discord/login", base_url))
        .query(&[("address", address.as_str()), ("code", "oauth-code")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let user: Value = res.json().await.unwrap();
    assert_eq!(user, expected);

    let res = client
        .get(format!("{}/api/discord/user", base_url))
        .query(&[("address", address.to_lowercase())])
        .send()
        .await
        .unwrap();
    let user: Value = res.json().await.unwrap();
    assert_eq!(user, expected);

    // The session carries the linked account
    let session: Value = client
        .get(format!("{}/api/auth/session", base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(session["discord"], expected);

    let res = client
        .post(format!("{}/api/discord/logout", base_url))
        .query(&[("address", address.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let user: Value = client
        .get(format!("{}/api/discord/user", base_url))
        .query(&[("address", address.as_str())])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(user, Value::Null);
}

#[tokio::test]
async fn test_discord_login_upstream_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "error": "invalid_client" })),
        )
        .mount(&server)
        .await;

    let base_url = spawn_test_server(discord_config(&server)).await;
    let address = address_of(&wallet(7)).to_checksum();

    let res = reqwest::Client::new()
        .get(format!("{}/api/discord/login", base_url))
        .query(&[("address", address.as_str()), ("code", "bad")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 502);
}

#[tokio::test]
async fn test_discord_logout_missing_address() {
    let base_url = spawn_test_server(test_config()).await;
    let res = reqwest::Client::new()
        .post(format!("{}/api/discord/logout", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    assert_eq!(res.text().await.unwrap(), "Missing address");
}
