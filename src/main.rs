use blog_portal::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    identity::{GithubProvider, IdentityProvider, ProviderRegistry},
    repository::{RepositoryState, SqliteRepository},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Entry point: configuration, logging, database, identity providers, then the
/// HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise crate debug plus request traces.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "blog_portal=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for log aggregation.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Database: connect and bring the schema up to date.
    let sqlite = SqliteRepository::connect(&config.db_url, 5)
        .await
        .expect("FATAL: Failed to open the SQLite database. Check DATABASE_URL.");
    sqlite
        .migrate()
        .await
        .expect("FATAL: Failed to apply database migrations.");
    let repo = Arc::new(sqlite) as RepositoryState;

    // 4. External identity providers, registered only when configured.
    let mut providers: Vec<Arc<dyn IdentityProvider>> = Vec::new();
    match &config.github {
        Some(github) => providers.push(Arc::new(GithubProvider::new(github))),
        None => tracing::info!("GitHub sign-in disabled: GITHUB_CLIENT_ID/SECRET not set"),
    }
    if config.admin_registration_token.is_none() {
        tracing::info!("Admin self-registration disabled: ADMIN_REGISTRATION_TOKEN not set");
    }

    // 5. Unified state and server startup.
    let bind_addr = config.bind_addr.clone();
    let public_url = config.public_url.clone();
    let app = create_router(AppState::new(repo, ProviderRegistry::new(providers), config));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at: {}/swagger-ui", public_url);

    axum::serve(listener, app).await.expect("HTTP server error");
}
