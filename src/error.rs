use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// ConflictKind
///
/// Names the uniqueness rule a write collided with. The reconciler and the
/// registration flow branch on this to decide between retrying and surfacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    Username,
    Email,
    /// The (provider, external subject) pair is already attached to an account.
    ExternalIdentity,
    /// The account owning the email is linked to a different external identity.
    AlreadyLinked,
    Like,
    Other,
}

impl ConflictKind {
    /// Classifies a storage-level unique violation by the columns it names.
    /// SQLite reports e.g. `UNIQUE constraint failed: users.username`.
    pub fn from_constraint_message(message: &str) -> Self {
        if message.contains("users.oauth_provider") || message.contains("users_oauth_identity") {
            ConflictKind::ExternalIdentity
        } else if message.contains("users.username") {
            ConflictKind::Username
        } else if message.contains("users.email") {
            ConflictKind::Email
        } else if message.contains("likes.user_id") {
            ConflictKind::Like
        } else {
            ConflictKind::Other
        }
    }

    fn message(self) -> &'static str {
        match self {
            ConflictKind::Username => "Username is already in use.",
            ConflictKind::Email => "Email is already in use.",
            ConflictKind::ExternalIdentity => "This external account is already linked.",
            ConflictKind::AlreadyLinked => "This email is already linked to another account.",
            ConflictKind::Like => "Post is already liked.",
            ConflictKind::Other => "Resource already exists.",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Bad input shape; the caller can fix it and resubmit.
    #[error("{0}")]
    Validation(String),

    /// No session, or credentials that do not check out.
    #[error("{0}")]
    Unauthenticated(String),

    /// A role or ownership check failed. Nothing was mutated.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{}", .0.message())]
    Conflict(ConflictKind),

    /// The external identity provider failed or returned nothing usable.
    #[error("Identity provider error: {0}")]
    UpstreamIdentity(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::UpstreamIdentity(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "Internal server error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::UpstreamIdentity(msg) => {
                tracing::warn!("Identity provider error: {}", msg);
                self.to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
