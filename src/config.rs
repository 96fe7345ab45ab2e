use std::env;
use std::net::SocketAddr;

pub const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Upper bound for configured TTLs (ten years).
pub const MAX_TTL_SECS: u64 = 315_360_000;

#[derive(Clone)]
pub struct Config {
    // Server
    pub bind_addr: SocketAddr,

    // Store (None = in-memory)
    pub redis_url: Option<String>,

    // Sign-in message
    pub siwe_domain: String,
    pub siwe_uri: String,
    pub siwe_statement: Option<String>,
    pub supported_chain_ids: Vec<u64>,

    // TTLs (in seconds)
    pub nonce_ttl_secs: u64,
    pub session_ttl_secs: u64,
    pub discord_link_ttl_secs: u64,

    // Rate limiting
    pub rate_limit_nonce_per_min: u32,

    // Proxy
    pub trusted_proxy_count: usize,

    // Discord
    pub discord_api_base: String,
    pub discord_bot_token: Option<String>,
    pub discord_client_id: Option<String>,
    pub discord_client_secret: Option<String>,
    pub discord_redirect_uri: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_addr", &self.bind_addr)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .field("siwe_domain", &self.siwe_domain)
            .field("siwe_uri", &self.siwe_uri)
            .field("siwe_statement", &self.siwe_statement)
            .field("supported_chain_ids", &self.supported_chain_ids)
            .field("nonce_ttl_secs", &self.nonce_ttl_secs)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("discord_link_ttl_secs", &self.discord_link_ttl_secs)
            .field("rate_limit_nonce_per_min", &self.rate_limit_nonce_per_min)
            .field("trusted_proxy_count", &self.trusted_proxy_count)
            .field("discord_api_base", &self.discord_api_base)
            .field(
                "discord_bot_token",
                &self.discord_bot_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("discord_client_id", &self.discord_client_id)
            .field(
                "discord_client_secret",
                &self.discord_client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("discord_redirect_uri", &self.discord_redirect_uri)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Attempt to load .env file, but don't fail if it doesn't exist
        // (env vars may be set directly in production)
        let _ = dotenvy::dotenv();

        // Server
        let bind_addr_str = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::ParseError("BIND_ADDR".to_string(), e.to_string()))?;

        let redis_url = optional_var("REDIS_URL");

        // Sign-in message - SIWE_DOMAIN is required
        let siwe_domain = env::var("SIWE_DOMAIN")
            .map_err(|_| ConfigError::MissingVar("SIWE_DOMAIN".to_string()))?;
        if siwe_domain.is_empty() || siwe_domain.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidValue(
                "SIWE_DOMAIN".to_string(),
                "must be a non-empty host without whitespace".to_string(),
            ));
        }

        let siwe_uri =
            env::var("SIWE_URI").unwrap_or_else(|_| format!("https://{}", siwe_domain));
        url::Url::parse(&siwe_uri)
            .map_err(|e| ConfigError::InvalidValue("SIWE_URI".to_string(), e.to_string()))?;

        // An explicitly empty statement omits the statement line
        let siwe_statement = match env::var("SIWE_STATEMENT") {
            Ok(s) if s.is_empty() => None,
            Ok(s) if s.contains('\n') => {
                return Err(ConfigError::InvalidValue(
                    "SIWE_STATEMENT".to_string(),
                    "must be a single line".to_string(),
                ));
            }
            Ok(s) => Some(s),
            Err(_) => Some("Sign in to Nance.".to_string()),
        };

        let supported_chain_ids = parse_chain_ids(
            &env::var("SUPPORTED_CHAIN_IDS").unwrap_or_else(|_| "1,5,10,137".to_string()),
        )?;

        // TTLs
        let nonce_ttl_secs = parse_env_or_default("NONCE_TTL_SECS", 300)?;
        let session_ttl_secs = parse_env_or_default("SESSION_TTL_SECS", 2_592_000)?;
        let discord_link_ttl_secs = parse_env_or_default("DISCORD_LINK_TTL_SECS", 604_800)?;
        for (key, value) in [
            ("NONCE_TTL_SECS", nonce_ttl_secs),
            ("SESSION_TTL_SECS", session_ttl_secs),
            ("DISCORD_LINK_TTL_SECS", discord_link_ttl_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue(
                    key.to_string(),
                    "must be greater than zero".to_string(),
                ));
            }
            if value > MAX_TTL_SECS {
                return Err(ConfigError::InvalidValue(
                    key.to_string(),
                    format!("must be at most {} seconds", MAX_TTL_SECS),
                ));
            }
        }

        // Rate limiting
        let rate_limit_nonce_per_min = parse_env_or_default("RATE_LIMIT_NONCE_PER_MIN", 30)?;

        // Proxy configuration
        let trusted_proxy_count = parse_env_or_default("TRUSTED_PROXY_COUNT", 0)?;

        // Discord
        let discord_api_base = env::var("DISCORD_API_BASE")
            .unwrap_or_else(|_| DEFAULT_DISCORD_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        let discord_bot_token = optional_var("DISCORD_BOT_TOKEN");
        let discord_client_id = optional_var("DISCORD_CLIENT_ID");
        let discord_client_secret = optional_var("DISCORD_CLIENT_SECRET");
        let discord_redirect_uri = optional_var("DISCORD_REDIRECT_URI");

        Ok(Config {
            bind_addr,
            redis_url,
            siwe_domain,
            siwe_uri,
            siwe_statement,
            supported_chain_ids,
            nonce_ttl_secs,
            session_ttl_secs,
            discord_link_ttl_secs,
            rate_limit_nonce_per_min,
            trusted_proxy_count,
            discord_api_base,
            discord_bot_token,
            discord_client_id,
            discord_client_secret,
            discord_redirect_uri,
        })
    }

    pub fn is_supported_chain(&self, chain_id: u64) -> bool {
        self.supported_chain_ids.contains(&chain_id)
    }

    /// Defaults for tests and local runs: in-memory store, no Discord credentials.
    pub fn for_domain(domain: &str) -> Self {
        Config {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            redis_url: None,
            siwe_domain: domain.to_string(),
            siwe_uri: format!("https://{}", domain),
            siwe_statement: Some("Sign in to Nance.".to_string()),
            supported_chain_ids: vec![1, 5, 10, 137],
            nonce_ttl_secs: 300,
            session_ttl_secs: 2_592_000,
            discord_link_ttl_secs: 604_800,
            rate_limit_nonce_per_min: 30,
            trusted_proxy_count: 0,
            discord_api_base: DEFAULT_DISCORD_API_BASE.to_string(),
            discord_bot_token: None,
            discord_client_id: None,
            discord_client_secret: None,
            discord_redirect_uri: None,
        }
    }
}

/// Unset and empty variables are both treated as absent
fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_chain_ids(value: &str) -> Result<Vec<u64>, ConfigError> {
    let ids = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>().map_err(|e| {
                ConfigError::ParseError("SUPPORTED_CHAIN_IDS".to_string(), format!("{}: {}", e, s))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if ids.is_empty() {
        return Err(ConfigError::InvalidValue(
            "SUPPORTED_CHAIN_IDS".to_string(),
            "at least one chain id is required".to_string(),
        ));
    }
    Ok(ids)
}

/// Helper function to parse environment variable with a default value
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(key.to_string(), format!("{}: {}", e, val))),
        Err(_) => Ok(default),
    }
}
