use std::{fmt, str::FromStr, sync::LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const USERNAME_MAX_LEN: usize = 30;
const USERNAME_MIN_LEN: usize = 3;
const EMAIL_MAX_LEN: usize = 255;
const PASSWORD_MIN_LEN: usize = 8;
const PASSWORD_MAX_LEN: usize = 128;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("static regex"));
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex"));

// --- Roles ---

/// Role
///
/// Coarse capability tier. Stored as lowercase text in `users.role`.
/// What each tier may do is decided in `policy`, never by comparing roles.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema,
    sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Author,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Author, Role::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Author => "author",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "author" => Ok(Role::Author),
            "admin" => Ok(Role::Admin),
            _ => Err(AppError::Validation("Invalid role selected.".to_string())),
        }
    }
}

// --- Core Schemas (Mapped to Database) ---

/// User
///
/// Canonical account record from the `users` table. The password hash never
/// leaves the server; the external identity pair is exposed so clients can show
/// which provider an account is linked to.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    /// Always stored lower-cased.
    pub email: String,
    #[serde(skip)]
    #[ts(skip)]
    pub password_hash: Option<String>,
    pub oauth_provider: Option<String>,
    pub oauth_subject: Option<String>,
    pub role: Role,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn has_external_identity(&self) -> bool {
        self.oauth_provider.is_some() || self.oauth_subject.is_some()
    }
}

/// NewUser
///
/// Insert payload for `Repository::create_user`. Built by registration (password)
/// or by the identity reconciler (external identity); at least one of the two
/// credentials is always present.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub oauth_provider: Option<String>,
    pub oauth_subject: Option<String>,
    pub role: Role,
}

/// Post
///
/// A blog entry owned by its author. `author_username` is filled by the read
/// queries that join `users`; inserts leave it empty.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub body: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    pub author_username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Comment {
    pub id: i64,
    pub body: String,
    pub author_id: Uuid,
    pub post_id: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub author_username: Option<String>,
}

/// Like
///
/// One row per (user, post). The pair is unique at the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Like {
    pub id: i64,
    pub user_id: Uuid,
    pub post_id: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    /// One of `user`, `author`, `admin`. Defaults to `user`.
    #[serde(default = "default_role_name")]
    pub role: String,
    /// Required when `role` is `admin`.
    #[serde(default)]
    pub admin_token: Option<String>,
}

fn default_role_name() -> String {
    Role::User.as_str().to_string()
}

impl RegisterRequest {
    /// Checks the shape of every field and returns the parsed role.
    pub fn validate(&self) -> AppResult<Role> {
        validate_username(&self.username)?;
        validate_email(&self.email)?;

        let password_len = self.password.chars().count();
        if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&password_len) {
            return Err(AppError::Validation(format!(
                "Password must be between {PASSWORD_MIN_LEN} and {PASSWORD_MAX_LEN} characters."
            )));
        }
        if self.password != self.confirm_password {
            return Err(AppError::Validation("Passwords must match.".to_string()));
        }

        self.role.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// PostRequest
///
/// Full payload for creating or editing a post.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PostRequest {
    pub title: String,
    pub body: String,
}

impl PostRequest {
    pub fn validate(&self) -> AppResult<()> {
        let title_len = self.title.trim().chars().count();
        if !(3..=140).contains(&title_len) {
            return Err(AppError::Validation(
                "Title must be between 3 and 140 characters.".to_string(),
            ));
        }
        if self.body.trim().chars().count() < 10 {
            return Err(AppError::Validation(
                "Content must be at least 10 characters.".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CommentRequest {
    pub body: String,
}

impl CommentRequest {
    pub fn validate(&self) -> AppResult<()> {
        let len = self.body.trim().chars().count();
        if !(2..=1000).contains(&len) {
            return Err(AppError::Validation(
                "Comment must be between 2 and 1000 characters.".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RoleUpdateRequest {
    pub role: String,
}

// --- Responses (Output Schemas) ---

/// SessionResponse
///
/// Returned when a session is established. The same token is also set as the
/// `session` cookie.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS, ToSchema, PartialEq, Eq)]
#[ts(export)]
pub struct LikeState {
    pub liked: bool,
    pub likes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PostDetail {
    pub post: Post,
    pub comments: Vec<Comment>,
    pub likes: i64,
    pub liked_by_viewer: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq, Eq)]
#[ts(export)]
pub struct AdminDashboardStats {
    pub total_users: i64,
    pub total_posts: i64,
    pub total_comments: i64,
    pub total_likes: i64,
}

// --- Field validation ---

pub fn validate_username(username: &str) -> AppResult<()> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(AppError::Validation(format!(
            "Username must be between {USERNAME_MIN_LEN} and {USERNAME_MAX_LEN} characters."
        )));
    }
    if !USERNAME_RE.is_match(username) {
        return Err(AppError::Validation(
            "Use letters, numbers, dots, underscores, and dashes.".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> AppResult<()> {
    let email = email.trim();
    if email.len() > EMAIL_MAX_LEN || !EMAIL_RE.is_match(email) {
        return Err(AppError::Validation("Invalid email address.".to_string()));
    }
    Ok(())
}

/// Canonical stored form of an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
