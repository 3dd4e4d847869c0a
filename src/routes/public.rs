use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session. Post detail still resolves the
/// optional `Viewer` so a signed-in reader sees whether they liked the post.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // --- Sessions ---
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        // GET /auth/login/{provider}
        // Starts an external login; 404 when the provider is not configured.
        .route("/auth/login/{provider}", get(handlers::oauth_start))
        // GET /auth/authorize/{provider}?code=...&state=...
        // Provider redirect target. Reconciles the external identity into a local account.
        .route("/auth/authorize/{provider}", get(handlers::oauth_callback))
        // --- Reading ---
        .route("/posts", get(handlers::list_posts))
        .route("/posts/{id}", get(handlers::get_post))
        .route("/posts/{id}/comments", get(handlers::list_comments))
}
