//! External identity providers and account reconciliation.
//!
//! An OAuth callback yields a verified `ProviderProfile`; `reconcile` turns it
//! into exactly one local account: the one already linked, an existing account
//! with the same email (linking it), or a freshly created one.

use std::{collections::HashMap, sync::Arc, sync::LazyLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::header;
use serde::Deserialize;

use crate::{
    config::OAuthClientConfig,
    error::{AppError, AppResult, ConflictKind},
    models::{NewUser, Role, USERNAME_MAX_LEN, User, normalize_email},
    repository::Repository,
};

/// Upper bound on insert attempts that lose a username race to a concurrent writer.
const MAX_USERNAME_CONFLICTS: u32 = 8;

static USERNAME_DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("static regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderEmail {
    pub email: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub verified: bool,
}

/// ProviderProfile
///
/// What a provider asserts about the signed-in subject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderProfile {
    pub external_id: String,
    /// The email on the public profile, if the provider exposes one.
    pub email: Option<String>,
    pub verified_emails: Vec<ProviderEmail>,
    /// Base for the local username of a newly created account.
    pub display_name: Option<String>,
}

/// IdentityProvider
///
/// A third-party login. `fetch_profile` is one blocking exchange with no
/// internal retry; any failure aborts the login attempt.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &str;
    fn authorize_url(&self, state: &str, redirect_uri: &str) -> String;
    async fn fetch_profile(&self, code: &str, redirect_uri: &str) -> AppResult<ProviderProfile>;
}

/// ProviderRegistry
///
/// Configured providers keyed by name. Unconfigured providers are simply absent.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Arc<HashMap<String, Arc<dyn IdentityProvider>>>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<Arc<dyn IdentityProvider>>) -> Self {
        let providers = providers
            .into_iter()
            .map(|p| (p.name().to_string(), p))
            .collect();
        Self {
            providers: Arc::new(providers),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn IdentityProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

// --- Reconciliation ---

/// The email an external login is matched and stored under: the public
/// profile email, else the primary verified one, else any verified one, else a
/// placeholder in the reserved `.invalid` domain.
pub fn candidate_email(provider: &str, profile: &ProviderProfile) -> String {
    let public = profile
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());
    let primary_verified = || {
        profile
            .verified_emails
            .iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email.as_str())
    };
    let any_verified = || {
        profile
            .verified_emails
            .iter()
            .find(|e| e.verified)
            .map(|e| e.email.as_str())
    };

    match public.or_else(primary_verified).or_else(any_verified) {
        Some(email) => normalize_email(email),
        None => normalize_email(&format!(
            "{provider}_{}@{provider}.users.invalid",
            profile.external_id
        )),
    }
}

/// Strips everything outside `[A-Za-z0-9_.-]` and lower-cases; `user` if nothing is left.
pub fn sanitize_username(base: &str) -> String {
    let cleaned = USERNAME_DISALLOWED.replace_all(base, "").to_lowercase();
    if cleaned.is_empty() {
        "user".to_string()
    } else {
        cleaned
    }
}

/// `suffix == 0` is the bare name. Otherwise the decimal suffix is appended after
/// truncating the base so the whole candidate stays within the length bound.
pub fn username_candidate(cleaned: &str, suffix: u32) -> String {
    // sanitized names are ASCII, byte slicing is char slicing
    if suffix == 0 {
        return cleaned[..cleaned.len().min(USERNAME_MAX_LEN)].to_string();
    }
    let suffix_text = suffix.to_string();
    let keep = cleaned.len().min(USERNAME_MAX_LEN - suffix_text.len());
    format!("{}{}", &cleaned[..keep], suffix_text)
}

/// Inserts `template` under the first free username derived from `base`.
///
/// The existence probe is only a hint: the unique index is authoritative, and a
/// username conflict on insert moves on to the next suffix.
pub async fn create_with_unique_username(
    repo: &dyn Repository,
    template: NewUser,
    base: &str,
) -> AppResult<User> {
    let cleaned = sanitize_username(base);
    let mut suffix = 0u32;
    let mut conflicts = 0u32;

    loop {
        let candidate = username_candidate(&cleaned, suffix);
        if repo.find_user_by_username(&candidate).await?.is_some() {
            suffix += 1;
            continue;
        }

        let new_user = NewUser {
            username: candidate.clone(),
            ..template.clone()
        };
        match repo.create_user(new_user).await {
            Ok(user) => return Ok(user),
            Err(AppError::Conflict(ConflictKind::Username)) if conflicts < MAX_USERNAME_CONFLICTS => {
                tracing::debug!(%candidate, "username taken concurrently, trying next suffix");
                conflicts += 1;
                suffix += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// reconcile
///
/// Resolves a verified provider profile to the local account that becomes the
/// session subject. Safe to repeat: once an identity is linked, step one finds
/// the same account every time, and losing a race against a duplicate callback
/// falls back to that lookup.
pub async fn reconcile(
    repo: &dyn Repository,
    provider: &str,
    profile: &ProviderProfile,
) -> AppResult<User> {
    let subject = profile.external_id.trim();
    if subject.is_empty() {
        return Err(AppError::UpstreamIdentity(
            "missing account identifier".to_string(),
        ));
    }

    if let Some(user) = repo.find_user_by_identity(provider, subject).await? {
        return Ok(user);
    }

    let email = candidate_email(provider, profile);
    let outcome = match repo.find_user_by_email(&email).await? {
        Some(existing)
            if existing.oauth_provider.as_deref() == Some(provider)
                && existing.oauth_subject.as_deref() == Some(subject) =>
        {
            // A duplicate callback committed between our identity lookup and now.
            return Ok(existing);
        }
        Some(existing) if existing.has_external_identity() => {
            tracing::warn!(
                user_id = %existing.id,
                provider,
                "email belongs to an account linked to another identity"
            );
            return Err(AppError::Conflict(ConflictKind::AlreadyLinked));
        }
        Some(existing) => {
            tracing::info!(user_id = %existing.id, provider, "linking external identity to existing account");
            repo.link_identity(existing.id, provider, subject).await
        }
        None => {
            let base = profile
                .display_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("{provider}_{subject}"));
            let template = NewUser {
                username: String::new(),
                email,
                password_hash: None,
                oauth_provider: Some(provider.to_string()),
                oauth_subject: Some(subject.to_string()),
                role: Role::User,
            };
            let created = create_with_unique_username(repo, template, &base).await;
            if let Ok(user) = &created {
                tracing::info!(user_id = %user.id, username = %user.username, provider, "created account from external identity");
            }
            created
        }
    };

    match outcome {
        Ok(user) => Ok(user),
        // A duplicate callback for the same identity committed first.
        Err(AppError::Conflict(
            ConflictKind::ExternalIdentity | ConflictKind::Email | ConflictKind::AlreadyLinked,
        )) => repo
            .find_user_by_identity(provider, subject)
            .await?
            .ok_or(AppError::Conflict(ConflictKind::AlreadyLinked)),
        Err(e) => Err(e),
    }
}

/// Runs the full callback: profile exchange, then reconciliation.
pub async fn login_with_provider(
    repo: &dyn Repository,
    provider: &dyn IdentityProvider,
    code: &str,
    redirect_uri: &str,
) -> AppResult<User> {
    let profile = provider.fetch_profile(code, redirect_uri).await?;
    reconcile(repo, provider.name(), &profile).await
}

// --- GitHub ---

const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_API_BASE: &str = "https://api.github.com";

#[derive(Deserialize)]
struct GithubTokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct GithubUser {
    id: Option<i64>,
    login: Option<String>,
    email: Option<String>,
}

/// GithubProvider
///
/// OAuth app client for GitHub (`read:user user:email` scope).
pub struct GithubProvider {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    authorize_url: String,
    token_url: String,
    api_base: String,
}

impl GithubProvider {
    pub fn new(config: &OAuthClientConfig) -> Self {
        Self::with_endpoints(config, GITHUB_AUTHORIZE_URL, GITHUB_TOKEN_URL, GITHUB_API_BASE)
    }

    /// Points the client at other endpoints, e.g. GitHub Enterprise or a test double.
    pub fn with_endpoints(
        config: &OAuthClientConfig,
        authorize_url: &str,
        token_url: &str,
        api_base: &str,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            authorize_url: authorize_url.to_string(),
            token_url: token_url.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> AppResult<String> {
        let response = self
            .client
            .post(&self.token_url)
            .header(header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(upstream)?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamIdentity(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let token: GithubTokenResponse = response.json().await.map_err(upstream)?;
        match (token.access_token, token.error) {
            (Some(access_token), None) => Ok(access_token),
            (_, Some(error)) => Err(AppError::UpstreamIdentity(format!(
                "authorization failed: {}",
                token.error_description.unwrap_or(error)
            ))),
            (None, None) => Err(AppError::UpstreamIdentity(
                "token response carried no access token".to_string(),
            )),
        }
    }

    fn api_get(&self, path: &str, access_token: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}/{}", self.api_base, path))
            .bearer_auth(access_token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header(header::USER_AGENT, "blog-portal")
    }

    /// The emails listing is best effort; a failure just means no email.
    async fn fetch_emails(&self, access_token: &str) -> Vec<ProviderEmail> {
        let response = match self.api_get("user/emails", access_token).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::debug!(status = %r.status(), "github emails endpoint refused");
                return Vec::new();
            }
            Err(e) => {
                tracing::debug!("github emails request failed: {}", e);
                return Vec::new();
            }
        };
        response.json().await.unwrap_or_default()
    }
}

fn upstream(err: reqwest::Error) -> AppError {
    AppError::UpstreamIdentity(err.to_string())
}

#[async_trait]
impl IdentityProvider for GithubProvider {
    fn name(&self) -> &str {
        "github"
    }

    fn authorize_url(&self, state: &str, redirect_uri: &str) -> String {
        let mut url = match reqwest::Url::parse(&self.authorize_url) {
            Ok(url) => url,
            Err(_) => return self.authorize_url.clone(),
        };
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", "read:user user:email")
            .append_pair("state", state);
        url.to_string()
    }

    async fn fetch_profile(&self, code: &str, redirect_uri: &str) -> AppResult<ProviderProfile> {
        let access_token = self.exchange_code(code, redirect_uri).await?;

        let response = self
            .api_get("user", &access_token)
            .send()
            .await
            .map_err(upstream)?;
        if !response.status().is_success() {
            return Err(AppError::UpstreamIdentity(format!(
                "profile endpoint returned {}",
                response.status()
            )));
        }
        let user: GithubUser = response.json().await.map_err(upstream)?;

        let id = user.id.ok_or_else(|| {
            AppError::UpstreamIdentity("missing account identifier".to_string())
        })?;
        let email = user.email.filter(|e| !e.trim().is_empty());
        let verified_emails = if email.is_none() {
            self.fetch_emails(&access_token).await
        } else {
            Vec::new()
        };

        Ok(ProviderProfile {
            external_id: id.to_string(),
            email,
            verified_emails,
            display_name: user.login,
        })
    }
}
