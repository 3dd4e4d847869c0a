use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, put},
};

/// Admin Router Module
///
/// Moderation and oversight. Mounted under `/admin` behind the authentication
/// layer; non-admins receive 403 from the core operations.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/stats
        // Row counts for users, posts, comments and likes.
        .route("/stats", get(handlers::get_admin_stats))
        // GET /admin/users
        .route("/users", get(handlers::admin_list_users))
        // PUT /admin/users/{id}/role
        // An admin cannot remove their own admin role.
        .route("/users/{id}/role", put(handlers::admin_update_role))
        // DELETE /admin/users/{id}
        // Removes the account with all of its posts, comments and likes.
        .route("/users/{id}", delete(handlers::admin_delete_user))
        // GET /admin/posts
        .route("/posts", get(handlers::admin_list_posts))
        // DELETE /admin/posts/{id}
        // Force-delete any post.
        .route("/posts/{id}", delete(handlers::admin_delete_post))
}
