use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Every route here sits behind `auth_middleware`, so anonymous requests get a
/// 401 before reaching a handler. What a signed-in user may actually do is
/// decided by the role policy inside each core operation.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        .route("/me", get(handlers::get_me))
        // POST /posts
        // Authors and admins only.
        .route("/posts", post(handlers::create_post))
        // PUT/DELETE /posts/{id}
        // Owner or admin. Deleting cascades to comments and likes.
        .route(
            "/posts/{id}",
            put(handlers::update_post).delete(handlers::delete_post),
        )
        // POST /posts/{id}/like
        // Toggle. Calling twice restores the original state.
        .route("/posts/{id}/like", post(handlers::toggle_like))
        // POST /posts/{id}/comments
        .route("/posts/{id}/comments", post(handlers::add_comment))
        // PUT/DELETE /comments/{id}
        // Comment author or admin.
        .route(
            "/comments/{id}",
            put(handlers::update_comment).delete(handlers::delete_comment),
        )
}
