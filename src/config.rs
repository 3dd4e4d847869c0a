use std::env;

/// AppConfig
///
/// Holds the application's entire configuration state. Immutable once loaded and
/// pulled into handlers via FromRef as part of the shared application state.
#[derive(Clone)]
pub struct AppConfig {
    // Runtime environment marker. Controls log format, cookie flags and the dev bypass.
    pub env: Env,
    // SQLite connection URL.
    pub db_url: String,
    // Address the HTTP server binds to.
    pub bind_addr: String,
    // Externally visible base URL, used to build OAuth redirect URIs.
    pub public_url: String,
    // Secret used to sign and validate session tokens.
    pub session_secret: String,
    pub session_ttl_hours: i64,
    // Pre-shared secret for admin self-registration. None disables it.
    pub admin_registration_token: Option<String>,
    // GitHub OAuth app credentials; the provider is only registered when present.
    pub github: Option<OAuthClientConfig>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// Env
///
/// Runtime context: local development conveniences versus hardened production.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

const LOCAL_SESSION_SECRET: &str = "dev-change-this-secret";
const DEFAULT_SESSION_TTL_HOURS: i64 = 24;
/// Upper bound on session lifetime: one year.
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

impl Default for AppConfig {
    /// default
    ///
    /// A non-panicking configuration for tests: in-memory database, no admin
    /// token, no external providers.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: "sqlite::memory:".to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
            public_url: "http://localhost:3000".to_string(),
            session_secret: LOCAL_SESSION_SECRET.to_string(),
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            admin_registration_token: None,
            github: None,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every parameter from the environment at startup.
    ///
    /// # Panics
    /// Panics in production when `DATABASE_URL` or `SECRET_KEY` is missing, so the
    /// server never starts with a guessable signing secret.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let (db_url, session_secret) = match env {
            Env::Production => (
                env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in prod"),
                env::var("SECRET_KEY").expect("FATAL: SECRET_KEY must be set in production."),
            ),
            Env::Local => (
                env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://blog.db?mode=rwc".to_string()),
                env::var("SECRET_KEY").unwrap_or_else(|_| LOCAL_SESSION_SECRET.to_string()),
            ),
        };

        let session_ttl_hours = env::var("SESSION_TTL_HOURS")
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|hours| *hours > 0)
            .map(|hours| hours.min(MAX_SESSION_TTL_HOURS))
            .unwrap_or(DEFAULT_SESSION_TTL_HOURS);

        let admin_registration_token = non_blank("ADMIN_REGISTRATION_TOKEN");

        let github = match (non_blank("GITHUB_CLIENT_ID"), non_blank("GITHUB_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(OAuthClientConfig {
                client_id,
                client_secret,
            }),
            _ => None,
        };

        Self {
            env,
            db_url,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            session_secret,
            session_ttl_hours,
            admin_registration_token,
            github,
        }
    }
}

fn non_blank(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
