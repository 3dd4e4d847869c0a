use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env, MAX_SESSION_TTL_HOURS},
    error::{AppError, AppResult},
    models::User,
    repository::RepositoryState,
};

pub const SESSION_COOKIE: &str = "session";
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";
/// The CSRF state cookie only has to outlive one round trip to the provider.
const OAUTH_STATE_MAX_AGE_SECS: i64 = 600;

/// Claims
///
/// Payload of a session token. Only the account id is carried; role and
/// existence are re-read from the store on every request, so a deleted or
/// demoted user loses access immediately.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the account id.
    pub sub: Uuid,
    /// Expiration Time (exp), seconds since the epoch.
    pub exp: usize,
    /// Issued At (iat).
    pub iat: usize,
}

/// SessionManager
///
/// Issues and validates HS256-signed session tokens and renders the cookies
/// that carry them. Cheap to clone; lives in `AppState`.
#[derive(Clone)]
pub struct SessionManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    secure_cookies: bool,
}

impl SessionManager {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours.clamp(1, MAX_SESSION_TTL_HOURS)),
            secure_cookies: false,
        }
    }

    /// Cookies are marked `Secure` only in production, where the site is served over TLS.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            secure_cookies: config.env == Env::Production,
            ..Self::new(&config.session_secret, config.session_ttl_hours)
        }
    }

    /// issue
    ///
    /// Establishes a session for `user`: returns a signed token bound to the
    /// account id that expires after the configured TTL.
    pub fn issue(&self, user: &User) -> AppResult<String> {
        let now = Utc::now();
        let expires = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AppError::Internal("session expiry out of range".to_string()))?;
        let claims = Claims {
            sub: user.id,
            iat: now.timestamp() as usize,
            exp: expires.timestamp() as usize,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("failed to sign session token: {e}")))
    }

    /// validate
    ///
    /// Returns the account id a token was issued for, or None when the token is
    /// malformed, forged or expired.
    pub fn validate(&self, token: &str) -> Option<Uuid> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => Some(data.claims.sub),
            Err(e) => {
                match e.kind() {
                    ErrorKind::ExpiredSignature => tracing::debug!("expired session token"),
                    _ => tracing::debug!("rejected session token: {}", e),
                }
                None
            }
        }
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.num_seconds()
    }

    /// `Set-Cookie` value carrying a freshly issued session token.
    pub fn session_cookie(&self, token: &str) -> String {
        self.cookie(SESSION_COOKIE, token, self.ttl_seconds())
    }

    /// clear_cookie
    ///
    /// Ends the browser session. Tokens are stateless, so a copied token stays
    /// valid until it expires.
    pub fn clear_cookie(&self) -> String {
        self.cookie(SESSION_COOKIE, "", 0)
    }

    pub fn state_cookie(&self, state: &str) -> String {
        self.cookie(OAUTH_STATE_COOKIE, state, OAUTH_STATE_MAX_AGE_SECS)
    }

    pub fn clear_state_cookie(&self) -> String {
        self.cookie(OAUTH_STATE_COOKIE, "", 0)
    }

    fn cookie(&self, name: &str, value: &str, max_age: i64) -> String {
        let mut cookie = format!("{name}={value}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age}");
        if self.secure_cookies {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Value of the cookie `name` from the request's `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// The presented session token: a Bearer header wins over the cookie.
fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());

    bearer
        .or_else(|| cookie_value(headers, SESSION_COOKIE))
        .filter(|token| !token.is_empty())
}

/// Viewer
///
/// The identity behind a request, resolved to a live account. Anything short
/// of a valid token for an existing user is `Anonymous`; resolution never
/// rejects a request on its own.
#[derive(Debug, Clone)]
pub enum Viewer {
    Anonymous,
    Authenticated(User),
}

impl Viewer {
    pub fn user(&self) -> Option<&User> {
        match self {
            Viewer::Anonymous => None,
            Viewer::Authenticated(user) => Some(user),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Viewer::Authenticated(_))
    }
}

/// Viewer Extractor Implementation
///
/// 1. Local Bypass: in `Env::Local` a known account id in `x-user-id` is accepted.
/// 2. Token Extraction: `Authorization: Bearer` header, else the `session` cookie.
/// 3. Token Validation through the `SessionManager`.
/// 4. Store Lookup: the account must still exist.
///
/// Rejection: only a store failure (500). Bad credentials yield `Anonymous`.
impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    SessionManager: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let sessions = SessionManager::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|id| Uuid::parse_str(id).ok());
            if let Some(user_id) = bypass_id {
                if let Some(user) = repo.get_user(user_id).await? {
                    return Ok(Viewer::Authenticated(user));
                }
            }
        }

        let Some(user_id) = session_token(&parts.headers).and_then(|t| sessions.validate(&t)) else {
            return Ok(Viewer::Anonymous);
        };

        Ok(match repo.get_user(user_id).await? {
            Some(user) => Viewer::Authenticated(user),
            None => Viewer::Anonymous,
        })
    }
}

/// AuthUser
///
/// A `Viewer` that must be signed in. Handlers taking this argument answer
/// 401 for anonymous requests before any of their own logic runs.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    SessionManager: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Viewer::from_request_parts(parts, state).await? {
            Viewer::Authenticated(user) => Ok(AuthUser(user)),
            Viewer::Anonymous => Err(AppError::Unauthenticated(
                "Please log in to continue.".to_string(),
            )),
        }
    }
}
