//! Wallet authentication: nonces, signature verification and sessions.

pub mod middleware;
pub mod service;
pub mod session;
pub mod verifier;

pub use middleware::{check_rate_limit, client_ip, AppState, AuthSession};
pub use service::AuthService;
pub use session::{generate_nonce, generate_session_token};
pub use verifier::{AttemptState, RejectReason};
