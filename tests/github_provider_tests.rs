use axum::{
    Form, Json, Router,
    http::{HeaderMap, StatusCode, header},
    routing::{get, post},
};
use blog_portal::{
    AppError,
    config::OAuthClientConfig,
    identity::{GithubProvider, IdentityProvider},
};
use serde_json::{Value, json};
use std::collections::HashMap;
use tokio::net::TcpListener;

/// How the fake GitHub behaves for one test.
#[derive(Clone, Copy)]
enum Scenario {
    PublicEmail,
    PrivateEmail,
    EmailsForbidden,
    TokenDenied,
    ProfileWithoutId,
}

async fn spawn_fake_github(scenario: Scenario) -> String {
    let token = move |Form(form): Form<HashMap<String, String>>| async move {
        assert_eq!(form.get("client_id").map(String::as_str), Some("client-id"));
        assert_eq!(form.get("client_secret").map(String::as_str), Some("client-secret"));
        match (scenario, form.get("code").map(String::as_str)) {
            (Scenario::TokenDenied, _) => Json(json!({
                "error": "bad_verification_code",
                "error_description": "The code passed is incorrect or expired."
            })),
            (_, Some("good-code")) => Json(json!({ "access_token": "gho_test", "token_type": "bearer" })),
            _ => Json(json!({ "error": "bad_verification_code" })),
        }
    };

    let user = move |headers: HeaderMap| async move {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if auth != "Bearer gho_test" {
            return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Bad credentials" })));
        }
        assert!(headers.contains_key(header::USER_AGENT), "GitHub requires a User-Agent");

        let body: Value = match scenario {
            Scenario::PublicEmail => json!({ "id": 1001, "login": "octocat", "email": "Octo@Example.com" }),
            Scenario::ProfileWithoutId => json!({ "login": "ghost" }),
            _ => json!({ "id": 1002, "login": "hidden", "email": null }),
        };
        (StatusCode::OK, Json(body))
    };

    let emails = move || async move {
        match scenario {
            Scenario::EmailsForbidden => (StatusCode::FORBIDDEN, Json(json!({ "message": "scope" }))),
            _ => (
                StatusCode::OK,
                Json(json!([
                    { "email": "noreply@users.github.com", "primary": false, "verified": true },
                    { "email": "hidden@example.com", "primary": true, "verified": true }
                ])),
            ),
        }
    };

    let app = Router::new()
        .route("/login/oauth/access_token", post(token))
        .route("/user", get(user))
        .route("/user/emails", get(emails));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    address
}

fn provider(base: &str) -> GithubProvider {
    let config = OAuthClientConfig {
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
    };
    GithubProvider::with_endpoints(
        &config,
        &format!("{base}/login/oauth/authorize"),
        &format!("{base}/login/oauth/access_token"),
        base,
    )
}

#[tokio::test]
async fn test_authorize_url_carries_client_state_and_scope() {
    let github = provider("https://github.test");
    let url = reqwest::Url::parse(&github.authorize_url("xyz", "http://localhost:3000/auth/authorize/github")).unwrap();

    assert_eq!(url.path(), "/login/oauth/authorize");
    let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
    assert_eq!(query["client_id"], "client-id");
    assert_eq!(query["state"], "xyz");
    assert_eq!(query["redirect_uri"], "http://localhost:3000/auth/authorize/github");
    assert_eq!(query["scope"], "read:user user:email");
}

#[tokio::test]
async fn test_profile_with_public_email() {
    let base = spawn_fake_github(Scenario::PublicEmail).await;
    let profile = provider(&base)
        .fetch_profile("good-code", "http://localhost/cb")
        .await
        .unwrap();

    assert_eq!(profile.external_id, "1001");
    assert_eq!(profile.email.as_deref(), Some("Octo@Example.com"));
    assert_eq!(profile.display_name.as_deref(), Some("octocat"));
    assert!(profile.verified_emails.is_empty(), "emails endpoint not needed");
}

#[tokio::test]
async fn test_private_email_falls_back_to_emails_endpoint() {
    let base = spawn_fake_github(Scenario::PrivateEmail).await;
    let profile = provider(&base)
        .fetch_profile("good-code", "http://localhost/cb")
        .await
        .unwrap();

    assert_eq!(profile.external_id, "1002");
    assert!(profile.email.is_none());
    assert_eq!(profile.verified_emails.len(), 2);
    assert_eq!(
        blog_portal::identity::candidate_email("github", &profile),
        "hidden@example.com"
    );
}

#[tokio::test]
async fn test_emails_endpoint_failure_is_tolerated() {
    let base = spawn_fake_github(Scenario::EmailsForbidden).await;
    let profile = provider(&base)
        .fetch_profile("good-code", "http://localhost/cb")
        .await
        .unwrap();

    assert!(profile.verified_emails.is_empty());
    assert_eq!(
        blog_portal::identity::candidate_email("github", &profile),
        "github_1002@github.users.invalid"
    );
}

#[tokio::test]
async fn test_rejected_code_is_upstream_error() {
    let base = spawn_fake_github(Scenario::TokenDenied).await;
    let result = provider(&base).fetch_profile("good-code", "http://localhost/cb").await;

    match result {
        Err(AppError::UpstreamIdentity(msg)) => assert!(msg.contains("incorrect or expired")),
        other => panic!("expected UpstreamIdentity, got {other:?}"),
    }
}

#[tokio::test]
async fn test_profile_without_id_is_upstream_error() {
    let base = spawn_fake_github(Scenario::ProfileWithoutId).await;
    let result = provider(&base).fetch_profile("good-code", "http://localhost/cb").await;
    assert!(matches!(result, Err(AppError::UpstreamIdentity(_))));
}

#[tokio::test]
async fn test_unreachable_provider_is_upstream_error() {
    // nothing listens on port 9 of localhost
    let result = provider("http://127.0.0.1:9")
        .fetch_profile("good-code", "http://localhost/cb")
        .await;
    assert!(matches!(result, Err(AppError::UpstreamIdentity(_))));
}
