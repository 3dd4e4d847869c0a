use crate::{
    AppState,
    accounts,
    auth::{AuthUser, OAUTH_STATE_COOKIE, Viewer, cookie_value},
    content,
    error::{AppError, AppResult},
    identity,
    models::{
        AdminDashboardStats, Comment, CommentRequest, LikeState, LoginRequest, Post, PostDetail,
        PostRequest, RegisterRequest, Role, RoleUpdateRequest, SessionResponse, User,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{AppendHeaders, IntoResponse, Redirect},
};
use serde::Deserialize;
use uuid::Uuid;

// --- Query Structs ---

/// OAuthCallback
///
/// Query parameters a provider appends when redirecting back after consent.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by the provider when the user denied access or the request was invalid.
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Builds the response that establishes a session: the token goes both into the
/// `session` cookie and into the JSON body.
fn session_response(
    state: &AppState,
    status: StatusCode,
    user: User,
    extra_cookies: Vec<String>,
) -> AppResult<impl IntoResponse + use<>> {
    let token = state.sessions.issue(&user)?;
    let mut cookies = vec![state.sessions.session_cookie(&token)];
    cookies.extend(extra_cookies);

    let set_cookies: Vec<_> = cookies
        .into_iter()
        .map(|cookie| (header::SET_COOKIE, cookie))
        .collect();

    Ok((status, AppendHeaders(set_cookies), Json(SessionResponse { token, user })))
}

// --- Session Handlers ---

/// register
///
/// [Public Route] Creates a local account and signs it in.
/// Admin accounts additionally require the server's admin registration token.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = SessionResponse),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Admin registration refused"),
        (status = 409, description = "Username or email taken")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let user = accounts::register(
        state.repo.as_ref(),
        state.config.admin_registration_token.as_deref(),
        payload,
    )
    .await?;
    session_response(&state, StatusCode::CREATED, user, Vec::new())
}

/// login
///
/// [Public Route] Email and password sign-in.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 401, description = "Invalid email or password")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let user = accounts::login(state.repo.as_ref(), payload).await?;
    session_response(&state, StatusCode::OK, user, Vec::new())
}

/// logout
///
/// [Public Route] Clears the session cookie. Always succeeds.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Session cleared"))
)]
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        AppendHeaders([(header::SET_COOKIE, state.sessions.clear_cookie())]),
    )
}

/// oauth_start
///
/// [Public Route] Redirects the browser to the provider's consent page. A random
/// `state` is stored in a short-lived cookie and checked on the way back.
#[utoipa::path(
    get,
    path = "/auth/login/{provider}",
    responses(
        (status = 303, description = "Redirect to the provider"),
        (status = 404, description = "Provider not configured")
    )
)]
pub async fn oauth_start(
    State(state): State<AppState>,
    Path(provider_name): Path<String>,
) -> AppResult<impl IntoResponse> {
    let provider = state
        .providers
        .get(&provider_name)
        .ok_or(AppError::NotFound("Provider"))?;

    let csrf_state = Uuid::new_v4().simple().to_string();
    let redirect_uri = callback_uri(&state, &provider_name);
    let location = provider.authorize_url(&csrf_state, &redirect_uri);

    Ok((
        AppendHeaders([(header::SET_COOKIE, state.sessions.state_cookie(&csrf_state))]),
        Redirect::to(&location),
    ))
}

/// oauth_callback
///
/// [Public Route] Completes an external login: verifies `state`, exchanges the
/// code for a profile, reconciles it into a local account and signs it in.
#[utoipa::path(
    get,
    path = "/auth/authorize/{provider}",
    params(OAuthCallback),
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 400, description = "Missing code or state"),
        (status = 403, description = "State mismatch"),
        (status = 404, description = "Provider not configured"),
        (status = 409, description = "Email linked to a different external account"),
        (status = 502, description = "Provider failure")
    )
)]
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider_name): Path<String>,
    Query(params): Query<OAuthCallback>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let provider = state
        .providers
        .get(&provider_name)
        .ok_or(AppError::NotFound("Provider"))?;

    if let Some(error) = params.error {
        let detail = params.error_description.unwrap_or(error);
        return Err(AppError::UpstreamIdentity(format!(
            "{provider_name} sign-in failed: {detail}"
        )));
    }

    let expected = cookie_value(&headers, OAUTH_STATE_COOKIE).filter(|s| !s.is_empty());
    match (expected, params.state.as_deref()) {
        (Some(expected), Some(presented)) if expected == presented => {}
        (None, _) | (_, None) => {
            return Err(AppError::Validation("Missing OAuth state.".to_string()));
        }
        _ => {
            tracing::warn!(provider = %provider_name, "oauth state mismatch");
            return Err(AppError::Forbidden("OAuth state mismatch.".to_string()));
        }
    }

    let code = params
        .code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Missing authorization code.".to_string()))?;

    let redirect_uri = callback_uri(&state, &provider_name);
    let user =
        identity::login_with_provider(state.repo.as_ref(), provider.as_ref(), &code, &redirect_uri)
            .await?;

    tracing::info!(user_id = %user.id, provider = %provider_name, "external sign-in");
    let clear_state = state.sessions.clear_state_cookie();
    session_response(&state, StatusCode::OK, user, vec![clear_state])
}

fn callback_uri(state: &AppState, provider_name: &str) -> String {
    format!("{}/auth/authorize/{provider_name}", state.config.public_url)
}

/// get_me
///
/// [Authenticated Route] The signed-in account.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

// --- Post Handlers ---

#[utoipa::path(
    get,
    path = "/posts",
    responses((status = 200, description = "All posts, newest first", body = [Post]))
)]
pub async fn list_posts(State(state): State<AppState>) -> AppResult<Json<Vec<Post>>> {
    Ok(Json(content::list_posts(state.repo.as_ref()).await?))
}

/// get_post
///
/// [Public Route] Post detail with comments and like count. `liked_by_viewer`
/// is only ever true for a signed-in viewer.
#[utoipa::path(
    get,
    path = "/posts/{id}",
    responses(
        (status = 200, description = "Post detail", body = PostDetail),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_post(
    viewer: Viewer,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PostDetail>> {
    let detail = content::post_detail(state.repo.as_ref(), viewer.user(), id).await?;
    Ok(Json(detail))
}

/// create_post
///
/// [Authenticated Route] Authors and admins only.
#[utoipa::path(
    post,
    path = "/posts",
    request_body = PostRequest,
    responses(
        (status = 201, description = "Created", body = Post),
        (status = 403, description = "Role may not write posts")
    )
)]
pub async fn create_post(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<PostRequest>,
) -> AppResult<impl IntoResponse> {
    let post = content::create_post(state.repo.as_ref(), &user, payload).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// update_post
///
/// [Authenticated Route] Owner or admin.
#[utoipa::path(
    put,
    path = "/posts/{id}",
    request_body = PostRequest,
    responses(
        (status = 200, description = "Updated", body = Post),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_post(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PostRequest>,
) -> AppResult<Json<Post>> {
    Ok(Json(content::edit_post(state.repo.as_ref(), &user, id, payload).await?))
}

/// delete_post
///
/// [Authenticated Route] Owner or admin. Takes the post's comments and likes with it.
#[utoipa::path(
    delete,
    path = "/posts/{id}",
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_post(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    content::delete_post(state.repo.as_ref(), &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// toggle_like
///
/// [Authenticated Route] Likes or unlikes the post for the caller.
#[utoipa::path(
    post,
    path = "/posts/{id}/like",
    responses(
        (status = 200, description = "New like state", body = LikeState),
        (status = 403, description = "Role may not like"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn toggle_like(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LikeState>> {
    Ok(Json(content::toggle_like(state.repo.as_ref(), &user, id).await?))
}

// --- Comment Handlers ---

#[utoipa::path(
    get,
    path = "/posts/{id}/comments",
    responses(
        (status = 200, description = "Comments, oldest first", body = [Comment]),
        (status = 404, description = "Not Found")
    )
)]
pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> AppResult<Json<Vec<Comment>>> {
    Ok(Json(content::list_comments(state.repo.as_ref(), post_id).await?))
}

/// add_comment
///
/// [Authenticated Route] Plain users and admins may comment.
#[utoipa::path(
    post,
    path = "/posts/{id}/comments",
    request_body = CommentRequest,
    responses(
        (status = 201, description = "Comment Added", body = Comment),
        (status = 403, description = "Role may not comment"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn add_comment(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<CommentRequest>,
) -> AppResult<impl IntoResponse> {
    let comment = content::add_comment(state.repo.as_ref(), &user, post_id, payload).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

#[utoipa::path(
    put,
    path = "/comments/{id}",
    request_body = CommentRequest,
    responses(
        (status = 200, description = "Updated", body = Comment),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_comment(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<CommentRequest>,
) -> AppResult<Json<Comment>> {
    Ok(Json(content::edit_comment(state.repo.as_ref(), &user, id, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/comments/{id}",
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_comment(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    content::delete_comment(state.repo.as_ref(), &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Admin Handlers ---
// Every admin handler re-checks the Administer capability in the core operation.

#[utoipa::path(
    get,
    path = "/admin/users",
    responses(
        (status = 200, description = "All users, newest first", body = [User]),
        (status = 403, description = "Admin Only")
    )
)]
pub async fn admin_list_users(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<User>>> {
    Ok(Json(accounts::list_users(state.repo.as_ref(), &user).await?))
}

/// admin_update_role
///
/// [Admin Route] Changes a user's role. Admins cannot demote themselves.
#[utoipa::path(
    put,
    path = "/admin/users/{id}/role",
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 400, description = "Unknown role"),
        (status = 403, description = "Admin Only"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn admin_update_role(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RoleUpdateRequest>,
) -> AppResult<Json<User>> {
    let role: Role = payload.role.parse()?;
    Ok(Json(accounts::set_user_role(state.repo.as_ref(), &user, id, role).await?))
}

#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Admin Only"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn admin_delete_user(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    accounts::delete_user(state.repo.as_ref(), &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/admin/posts",
    responses(
        (status = 200, description = "All posts", body = [Post]),
        (status = 403, description = "Admin Only")
    )
)]
pub async fn admin_list_posts(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Post>>> {
    Ok(Json(content::admin_list_posts(state.repo.as_ref(), &user).await?))
}

#[utoipa::path(
    delete,
    path = "/admin/posts/{id}",
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Admin Only"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn admin_delete_post(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    content::admin_delete_post(state.repo.as_ref(), &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// get_admin_stats
///
/// [Admin Route] Row counts for the dashboard.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses(
        (status = 200, description = "Stats", body = AdminDashboardStats),
        (status = 403, description = "Admin Only")
    )
)]
pub async fn get_admin_stats(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<AdminDashboardStats>> {
    Ok(Json(content::admin_stats(state.repo.as_ref(), &user).await?))
}
