use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core domain: roles and permissions, credentials, external identities.
pub mod error;
pub mod models;
pub mod policy;
pub mod credentials;
pub mod identity;

// Operations that authorize and then write through the repository.
pub mod accounts;
pub mod content;

// Infrastructure and HTTP surface.
pub mod auth;
pub mod config;
pub mod handlers;
pub mod repository;

pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use auth::SessionManager;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use identity::ProviderRegistry;
pub use repository::{RepositoryState, SqliteRepository};

/// ApiDoc
///
/// OpenAPI document aggregated from the `#[utoipa::path]` handlers and the
/// `ToSchema` models. Served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register, handlers::login, handlers::logout, handlers::oauth_start,
        handlers::oauth_callback, handlers::get_me, handlers::list_posts, handlers::get_post,
        handlers::create_post, handlers::update_post, handlers::delete_post,
        handlers::toggle_like, handlers::list_comments, handlers::add_comment,
        handlers::update_comment, handlers::delete_comment, handlers::admin_list_users,
        handlers::admin_update_role, handlers::admin_delete_user, handlers::admin_list_posts,
        handlers::admin_delete_post, handlers::get_admin_stats
    ),
    components(
        schemas(
            models::Role, models::User, models::Post, models::Comment, models::Like,
            models::RegisterRequest, models::LoginRequest, models::PostRequest,
            models::CommentRequest, models::RoleUpdateRequest, models::SessionResponse,
            models::LikeState, models::PostDetail, models::AdminDashboardStats,
        )
    ),
    tags(
        (name = "blog-portal", description = "Blog Portal API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container for every service a request may need. Handlers
/// and extractors pull the parts they use through the `FromRef` impls below.
#[derive(Clone)]
pub struct AppState {
    /// Persistent store behind the `Repository` trait.
    pub repo: RepositoryState,
    /// Issues and validates session tokens.
    pub sessions: SessionManager,
    /// Configured external identity providers.
    pub providers: ProviderRegistry,
    pub config: AppConfig,
}

impl AppState {
    /// Assembles the state from a loaded configuration, deriving the session
    /// manager from it.
    pub fn new(repo: RepositoryState, providers: ProviderRegistry, config: AppConfig) -> Self {
        Self {
            sessions: SessionManager::from_config(&config),
            repo,
            providers,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for SessionManager {
    fn from_ref(app_state: &AppState) -> SessionManager {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for ProviderRegistry {
    fn from_ref(app_state: &AppState) -> ProviderRegistry {
        app_state.providers.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Rejects anonymous requests to the routes it wraps. Extracting `AuthUser`
/// resolves the session; when that fails the extractor's 401 is returned and
/// the handler never runs.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing tree, applies scoped and global middleware and
/// registers the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .with_state(state);

    // Observability: request id generation, a span per request carrying that id,
    // and propagation of the id back to the client.
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: method, URI and the `x-request-id`, so every
/// log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
