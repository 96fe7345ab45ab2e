//! nance-auth application entry point.
//!
//! Bootstraps the server:
//! 1. Load configuration from environment
//! 2. Connect to Redis, or fall back to the in-memory store
//! 3. Build router with API routes
//! 4. Apply CORS and security headers middleware
//! 5. Start Axum server
//!
//! Also supports a `sign` subcommand that signs a message with a wallet key,
//! for exercising the sign-in flow by hand.

use k256::ecdsa::SigningKey;
use nance_auth::{
    build_state, config::Config, middleware::security_headers, routes, siwe::signature,
    storage::{memory, KvStore, MemoryStore, RedisStore},
    time::SystemTimeSource,
};
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use zeroize::Zeroizing;

/// Sign the message read from stdin with a hex private key (EIP-191).
fn sign(private_key_hex: &str) -> Result<(String, String), String> {
    let key_bytes = Zeroizing::new(
        hex::decode(private_key_hex.trim_start_matches("0x"))
            .map_err(|e| format!("Invalid key hex: {}", e))?,
    );
    let key = SigningKey::from_slice(&key_bytes).map_err(|e| format!("Invalid key: {}", e))?;

    let mut message = String::new();
    std::io::stdin()
        .read_to_string(&mut message)
        .map_err(|e| format!("Read stdin: {}", e))?;
    // Shells append a newline the signed text does not have
    let message = message.strip_suffix('\n').unwrap_or(&message);

    let sig = signature::sign_message(&key, message.as_bytes())
        .map_err(|e| format!("Sign: {}", e))?;
    Ok((signature::address_of(&key).to_checksum(), sig))
}

fn print_sign_usage() {
    eprintln!("Usage: nance-auth sign <private-key-hex> < message.txt");
    eprintln!();
    eprintln!("Sign a sign-in message (read from stdin) with a wallet private key.");
    eprintln!("Prints the signer address and the 0x-prefixed signature.");
}

#[tokio::main]
async fn main() {
    // Check for sign subcommand
    let args: Vec<String> = std::env::args().collect();
    if args.len() >= 2 && args[1] == "sign" {
        if args.len() != 3 {
            print_sign_usage();
            std::process::exit(1);
        }

        match sign(&args[2]) {
            Ok((address, sig)) => {
                println!("{}", address);
                println!("{}", sig);
            }
            Err(e) => {
                eprintln!("Error signing message: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    // Initialize tracing with env filter support (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config from environment
    let config = Config::from_env().expect("Failed to load config");
    tracing::info!("Starting nance-auth on {}", config.bind_addr);

    let store: Arc<dyn KvStore> = match config.redis_url.as_deref() {
        Some(url) => Arc::new(
            RedisStore::connect(url)
                .await
                .expect("Failed to connect to Redis"),
        ),
        None => {
            tracing::warn!("REDIS_URL not set, using in-memory store (single instance only)");
            let store = Arc::new(MemoryStore::new());

            // Spawn expiry sweep (every 60 seconds)
            tokio::spawn(memory::run_sweep_loop(
                store.clone(),
                std::time::Duration::from_secs(60),
            ));

            store
        }
    };

    let bind_addr = config.bind_addr;
    let state = build_state(store, config, Arc::new(SystemTimeSource))
        .expect("Failed to build application state");

    // Explicit CORS: deny all cross-origin requests (same-origin front-end).
    let cors = CorsLayer::new();

    let app = routes::api_router()
        .layer(cors)
        .layer(axum::middleware::from_fn(security_headers))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("Failed to bind");
    tracing::info!("Listening on {}", bind_addr);

    // Start server (with_connect_info required for ConnectInfo<SocketAddr> extractors)
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
