mod common;

use blog_portal::{
    AppError,
    accounts,
    error::ConflictKind,
    models::{LoginRequest, RegisterRequest, Role},
    repository::Repository,
};
use common::{PASSWORD, repo, seed_post, seed_user};

fn registration(username: &str, email: &str, role: &str) -> RegisterRequest {
    RegisterRequest {
        username: username.to_string(),
        email: email.to_string(),
        password: "long enough password".to_string(),
        confirm_password: "long enough password".to_string(),
        role: role.to_string(),
        admin_token: None,
    }
}

// --- Registration ---

#[tokio::test]
async fn test_register_creates_local_account() {
    let repo = repo().await;
    let user = accounts::register(&repo, None, registration("newbie", "Newbie@Example.com", "author"))
        .await
        .unwrap();

    assert_eq!(user.username, "newbie");
    assert_eq!(user.email, "newbie@example.com");
    assert_eq!(user.role, Role::Author);
    assert!(user.check_password("long enough password"));
    assert!(!user.has_external_identity());
}

#[tokio::test]
async fn test_register_rejects_invalid_input_without_writing() {
    let repo = repo().await;

    let mut mismatched = registration("newbie", "newbie@example.com", "user");
    mismatched.confirm_password = "something else".to_string();
    let bad_inputs = [
        registration("ab", "newbie@example.com", "user"),
        registration("bad name!", "newbie@example.com", "user"),
        registration("newbie", "not-an-email", "user"),
        registration("newbie", "newbie@example.com", "superuser"),
        mismatched,
    ];

    for req in bad_inputs {
        let result = accounts::register(&repo, None, req).await;
        assert!(matches!(result, Err(AppError::Validation(_))), "got {result:?}");
    }
    assert!(repo.list_users().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_register_duplicate_email_or_username_is_conflict() {
    let repo = repo().await;
    seed_user(&repo, "taken", Role::User).await;

    let same_email = accounts::register(&repo, None, registration("fresh", "TAKEN@example.com", "user")).await;
    assert!(matches!(same_email, Err(AppError::Conflict(ConflictKind::Email))));

    let same_name = accounts::register(&repo, None, registration("taken", "fresh@example.com", "user")).await;
    assert!(matches!(same_name, Err(AppError::Conflict(ConflictKind::Username))));
}

#[tokio::test]
async fn test_admin_registration_requires_configured_token() {
    let repo = repo().await;

    let mut req = registration("boss", "boss@example.com", "admin");
    req.admin_token = Some("letmein".to_string());
    let disabled = accounts::register(&repo, None, req.clone()).await;
    assert!(matches!(disabled, Err(AppError::Forbidden(_))));

    req.admin_token = Some("wrong".to_string());
    let wrong = accounts::register(&repo, Some("letmein"), req.clone()).await;
    assert!(matches!(wrong, Err(AppError::Forbidden(_))));
    assert!(repo.list_users().await.unwrap().is_empty());

    req.admin_token = Some("letmein".to_string());
    let admin = accounts::register(&repo, Some("letmein"), req).await.unwrap();
    assert_eq!(admin.role, Role::Admin);
}

#[tokio::test]
async fn test_admin_token_checked_before_duplicates() {
    let repo = repo().await;
    seed_user(&repo, "boss", Role::User).await;

    let mut req = registration("boss", "boss@example.com", "admin");
    req.admin_token = Some("wrong".to_string());
    let result = accounts::register(&repo, Some("letmein"), req).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

// --- Login ---

#[tokio::test]
async fn test_login_is_case_insensitive_on_email() {
    let repo = repo().await;
    let alice = seed_user(&repo, "alice", Role::User).await;

    let user = accounts::login(
        &repo,
        LoginRequest {
            email: " ALICE@example.com".to_string(),
            password: PASSWORD.to_string(),
        },
    )
    .await
    .unwrap();
    assert_eq!(user.id, alice.id);
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let repo = repo().await;
    seed_user(&repo, "alice", Role::User).await;
    blog_portal::identity::reconcile(
        &repo,
        "github",
        &blog_portal::identity::ProviderProfile {
            external_id: "9".to_string(),
            email: Some("oauth@example.com".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let attempts = [
        ("alice@example.com", "wrong password"),
        ("nobody@example.com", PASSWORD),
        ("oauth@example.com", ""),
        ("oauth@example.com", PASSWORD),
    ];
    for (email, password) in attempts {
        let result = accounts::login(
            &repo,
            LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            },
        )
        .await;
        match result {
            Err(AppError::Unauthenticated(msg)) => assert_eq!(msg, "Invalid email or password."),
            other => panic!("expected Unauthenticated for {email}, got {other:?}"),
        }
    }
}

// --- Administration ---

#[tokio::test]
async fn test_admin_changes_roles_but_not_own_admin_role() {
    let repo = repo().await;
    let admin = seed_user(&repo, "admin", Role::Admin).await;
    let writer = seed_user(&repo, "writer", Role::User).await;

    let promoted = accounts::set_user_role(&repo, &admin, writer.id, Role::Author)
        .await
        .unwrap();
    assert_eq!(promoted.role, Role::Author);

    let self_demotion = accounts::set_user_role(&repo, &admin, admin.id, Role::User).await;
    assert!(matches!(self_demotion, Err(AppError::Forbidden(_))));
    let stored = repo.get_user(admin.id).await.unwrap().unwrap();
    assert_eq!(stored.role, Role::Admin);

    let missing = accounts::set_user_role(&repo, &admin, uuid::Uuid::new_v4(), Role::User).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_admin_may_demote_another_admin() {
    let repo = repo().await;
    let first = seed_user(&repo, "first", Role::Admin).await;
    let second = seed_user(&repo, "second", Role::Admin).await;

    let demoted = accounts::set_user_role(&repo, &first, second.id, Role::User)
        .await
        .unwrap();
    assert_eq!(demoted.role, Role::User);
}

#[tokio::test]
async fn test_non_admin_cannot_administer() {
    let repo = repo().await;
    let author = seed_user(&repo, "author", Role::Author).await;
    let target = seed_user(&repo, "target", Role::User).await;

    assert!(matches!(
        accounts::set_user_role(&repo, &author, target.id, Role::Admin).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        accounts::delete_user(&repo, &author, target.id).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        accounts::list_users(&repo, &author).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(repo.get_user(target.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_admin_deletes_user_and_their_content() {
    let repo = repo().await;
    let admin = seed_user(&repo, "admin", Role::Admin).await;
    let author = seed_user(&repo, "author", Role::Author).await;
    let post = seed_post(&repo, &author, "Doomed post").await;

    accounts::delete_user(&repo, &admin, author.id).await.unwrap();
    assert!(repo.get_user(author.id).await.unwrap().is_none());
    assert!(repo.get_post(post.id).await.unwrap().is_none());

    let again = accounts::delete_user(&repo, &admin, author.id).await;
    assert!(matches!(again, Err(AppError::NotFound(_))));

    let own = accounts::delete_user(&repo, &admin, admin.id).await;
    assert!(matches!(own, Err(AppError::Forbidden(_))));
}
