#![allow(dead_code)]

use std::sync::Arc;

use blog_portal::{
    AppConfig, AppState, create_router,
    identity::{IdentityProvider, ProviderRegistry},
    models::{NewUser, Post, PostRequest, Role, User},
    repository::{Repository, RepositoryState, SqliteRepository},
};
use tokio::net::TcpListener;

pub const PASSWORD: &str = "correct horse battery";

pub async fn repo() -> SqliteRepository {
    SqliteRepository::in_memory()
        .await
        .expect("in-memory database should open and migrate")
}

/// Inserts a password account named `username` with email `<username>@example.com`.
pub async fn seed_user(repo: &dyn Repository, username: &str, role: Role) -> User {
    let mut new_user = NewUser {
        username: username.to_string(),
        email: format!("{username}@example.com"),
        role,
        ..NewUser::default()
    };
    new_user.set_password(PASSWORD).expect("hashing should succeed");
    repo.create_user(new_user).await.expect("seed user")
}

pub async fn seed_post(repo: &dyn Repository, author: &User, title: &str) -> Post {
    repo.create_post(
        author.id,
        PostRequest {
            title: title.to_string(),
            body: "A body that is long enough to publish.".to_string(),
        },
    )
    .await
    .expect("seed post")
}

pub struct TestApp {
    pub address: String,
    pub repo: RepositoryState,
}

/// Serves the full router on an ephemeral port.
pub async fn spawn_app_with(
    config: AppConfig,
    providers: Vec<Arc<dyn IdentityProvider>>,
) -> TestApp {
    let repo = Arc::new(repo().await) as RepositoryState;
    let state = AppState::new(repo.clone(), ProviderRegistry::new(providers), config);
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp { address, repo }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(AppConfig::default(), Vec::new()).await
}
