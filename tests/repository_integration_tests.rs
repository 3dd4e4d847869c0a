mod common;

use blog_portal::{
    AppError,
    error::ConflictKind,
    models::{NewUser, PostRequest, Role},
    repository::Repository,
};
use common::{repo, seed_post, seed_user};
use std::time::Duration;
use uuid::Uuid;

fn external_user(username: &str, email: &str, provider: &str, subject: &str) -> NewUser {
    NewUser {
        username: username.to_string(),
        email: email.to_string(),
        oauth_provider: Some(provider.to_string()),
        oauth_subject: Some(subject.to_string()),
        ..NewUser::default()
    }
}

// --- Users ---

#[tokio::test]
async fn test_create_and_fetch_user() {
    let repo = repo().await;
    let created = seed_user(&repo, "alice", Role::Author).await;

    let fetched = repo.get_user(created.id).await.unwrap().expect("user exists");
    assert_eq!(fetched.username, "alice");
    assert_eq!(fetched.email, "alice@example.com");
    assert_eq!(fetched.role, Role::Author);
    assert!(fetched.password_hash.is_some());
    assert!(!fetched.has_external_identity());

    assert!(repo.get_user(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_username_is_conflict() {
    let repo = repo().await;
    seed_user(&repo, "alice", Role::User).await;

    let result = repo
        .create_user(external_user("alice", "other@example.com", "github", "1"))
        .await;
    assert!(matches!(result, Err(AppError::Conflict(ConflictKind::Username))));
}

#[tokio::test]
async fn test_email_uniqueness_ignores_case() {
    let repo = repo().await;
    seed_user(&repo, "alice", Role::User).await;

    let result = repo
        .create_user(external_user("alice2", "ALICE@Example.com", "github", "1"))
        .await;
    assert!(matches!(result, Err(AppError::Conflict(ConflictKind::Email))));

    let found = repo.find_user_by_email("  Alice@EXAMPLE.com ").await.unwrap();
    assert_eq!(found.map(|u| u.username), Some("alice".to_string()));
}

#[tokio::test]
async fn test_stored_email_is_lowercased() {
    let repo = repo().await;
    let user = repo
        .create_user(external_user("mixed", "Mixed.Case@Example.COM", "github", "9"))
        .await
        .unwrap();
    assert_eq!(user.email, "mixed.case@example.com");
}

#[tokio::test]
async fn test_external_identity_is_unique() {
    let repo = repo().await;
    repo.create_user(external_user("first", "first@example.com", "github", "77"))
        .await
        .unwrap();

    let result = repo
        .create_user(external_user("second", "second@example.com", "github", "77"))
        .await;
    assert!(matches!(result, Err(AppError::Conflict(ConflictKind::ExternalIdentity))));

    // same subject under another provider is a different identity
    repo.create_user(external_user("third", "third@example.com", "gitlab", "77"))
        .await
        .unwrap();

    let found = repo.find_user_by_identity("github", "77").await.unwrap().unwrap();
    assert_eq!(found.username, "first");
}

#[tokio::test]
async fn test_account_without_any_credential_is_rejected() {
    let repo = repo().await;
    let result = repo
        .create_user(NewUser {
            username: "ghost".to_string(),
            email: "ghost@example.com".to_string(),
            ..NewUser::default()
        })
        .await;
    assert!(matches!(result, Err(AppError::Database(_))));
}

#[tokio::test]
async fn test_link_identity_only_once() {
    let repo = repo().await;
    let alice = seed_user(&repo, "alice", Role::User).await;

    let linked = repo.link_identity(alice.id, "github", "100").await.unwrap();
    assert_eq!(linked.oauth_provider.as_deref(), Some("github"));
    assert_eq!(linked.oauth_subject.as_deref(), Some("100"));
    assert!(linked.password_hash.is_some(), "password survives linking");

    let again = repo.link_identity(alice.id, "github", "200").await;
    assert!(matches!(again, Err(AppError::Conflict(ConflictKind::AlreadyLinked))));

    let missing = repo.link_identity(Uuid::new_v4(), "github", "300").await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_link_identity_taken_by_other_account() {
    let repo = repo().await;
    repo.create_user(external_user("bob", "bob@example.com", "github", "5"))
        .await
        .unwrap();
    let alice = seed_user(&repo, "alice", Role::User).await;

    let result = repo.link_identity(alice.id, "github", "5").await;
    assert!(matches!(result, Err(AppError::Conflict(ConflictKind::ExternalIdentity))));
}

#[tokio::test]
async fn test_set_role_and_list_users() {
    let repo = repo().await;
    let alice = seed_user(&repo, "alice", Role::User).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    seed_user(&repo, "bob", Role::User).await;

    let updated = repo.set_user_role(alice.id, Role::Author).await.unwrap().unwrap();
    assert_eq!(updated.role, Role::Author);
    assert!(repo.set_user_role(Uuid::new_v4(), Role::Admin).await.unwrap().is_none());

    let names: Vec<_> = repo
        .list_users()
        .await
        .unwrap()
        .into_iter()
        .map(|u| u.username)
        .collect();
    assert_eq!(names, vec!["bob", "alice"], "newest first");
}

// --- Posts & Comments ---

#[tokio::test]
async fn test_post_crud_carries_author_username() {
    let repo = repo().await;
    let author = seed_user(&repo, "writer", Role::Author).await;

    let post = seed_post(&repo, &author, "First post").await;
    let fetched = repo.get_post(post.id).await.unwrap().unwrap();
    assert_eq!(fetched.title, "First post");
    assert_eq!(fetched.author_username.as_deref(), Some("writer"));

    let updated = repo
        .update_post(
            post.id,
            PostRequest {
                title: "  Renamed  ".to_string(),
                body: "An updated body with content.".to_string(),
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.title, "Renamed");
    assert!(updated.updated_at >= updated.created_at);

    assert!(repo.delete_post(post.id).await.unwrap());
    assert!(!repo.delete_post(post.id).await.unwrap());
    assert!(repo.get_post(post.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_posts_listed_newest_first() {
    let repo = repo().await;
    let author = seed_user(&repo, "writer", Role::Author).await;

    seed_post(&repo, &author, "Older").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    seed_post(&repo, &author, "Newer").await;

    let titles: Vec<_> = repo
        .list_posts()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.title)
        .collect();
    assert_eq!(titles, vec!["Newer", "Older"]);
}

#[tokio::test]
async fn test_post_for_missing_author_is_not_found() {
    let repo = repo().await;
    let result = repo
        .create_post(
            Uuid::new_v4(),
            PostRequest {
                title: "Orphan".to_string(),
                body: "Nobody wrote this one.".to_string(),
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_comments_oldest_first_with_author() {
    let repo = repo().await;
    let author = seed_user(&repo, "writer", Role::Author).await;
    let reader = seed_user(&repo, "reader", Role::User).await;
    let post = seed_post(&repo, &author, "Discuss").await;

    let first = repo
        .add_comment(post.id, reader.id, "First!".to_string())
        .await
        .unwrap();
    repo.add_comment(post.id, reader.id, "Second".to_string())
        .await
        .unwrap();

    let comments = repo.list_comments(post.id).await.unwrap();
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0].body, "First!");
    assert_eq!(comments[1].body, "Second");
    assert_eq!(comments[0].author_username.as_deref(), Some("reader"));

    let edited = repo
        .update_comment(first.id, "First, edited".to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(edited.body, "First, edited");

    assert!(repo.delete_comment(first.id).await.unwrap());
    assert!(repo.get_comment(first.id).await.unwrap().is_none());
    assert!(repo.update_comment(first.id, "gone".to_string()).await.unwrap().is_none());
}

// --- Likes ---

#[tokio::test]
async fn test_toggle_like_twice_restores_state() {
    let repo = repo().await;
    let author = seed_user(&repo, "writer", Role::Author).await;
    let reader = seed_user(&repo, "reader", Role::User).await;
    let post = seed_post(&repo, &author, "Likeable").await;

    assert!(repo.toggle_like(reader.id, post.id).await.unwrap());
    assert!(repo.has_liked(reader.id, post.id).await.unwrap());
    assert_eq!(repo.count_likes(post.id).await.unwrap(), 1);

    assert!(!repo.toggle_like(reader.id, post.id).await.unwrap());
    assert!(!repo.has_liked(reader.id, post.id).await.unwrap());
    assert_eq!(repo.count_likes(post.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_like_on_missing_post_is_not_found() {
    let repo = repo().await;
    let reader = seed_user(&repo, "reader", Role::User).await;

    let result = repo.toggle_like(reader.id, Uuid::new_v4()).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

// --- Cascades ---

#[tokio::test]
async fn test_deleting_post_removes_comments_and_likes() {
    let repo = repo().await;
    let author = seed_user(&repo, "writer", Role::Author).await;
    let reader = seed_user(&repo, "reader", Role::User).await;
    let post = seed_post(&repo, &author, "Short lived").await;

    let comment = repo
        .add_comment(post.id, reader.id, "Nice".to_string())
        .await
        .unwrap();
    repo.toggle_like(reader.id, post.id).await.unwrap();

    repo.delete_post(post.id).await.unwrap();

    assert!(repo.get_comment(comment.id).await.unwrap().is_none());
    assert_eq!(repo.count_likes(post.id).await.unwrap(), 0);
    let stats = repo.get_stats().await.unwrap();
    assert_eq!((stats.total_posts, stats.total_comments, stats.total_likes), (0, 0, 0));
}

#[tokio::test]
async fn test_deleting_user_removes_everything_they_own() {
    let repo = repo().await;
    let author = seed_user(&repo, "writer", Role::Author).await;
    let reader = seed_user(&repo, "reader", Role::User).await;
    let other = seed_user(&repo, "other", Role::User).await;

    let authors_post = seed_post(&repo, &author, "By the author").await;
    repo.add_comment(authors_post.id, other.id, "On the author's post".to_string())
        .await
        .unwrap();
    repo.toggle_like(other.id, authors_post.id).await.unwrap();

    let admin = seed_user(&repo, "admin", Role::Admin).await;
    let admins_post = seed_post(&repo, &admin, "By the admin").await;
    let readers_comment = repo
        .add_comment(admins_post.id, reader.id, "Reader comment".to_string())
        .await
        .unwrap();
    repo.toggle_like(reader.id, admins_post.id).await.unwrap();

    assert!(repo.delete_user(author.id).await.unwrap());
    assert!(repo.get_post(authors_post.id).await.unwrap().is_none());

    assert!(repo.delete_user(reader.id).await.unwrap());
    assert!(repo.get_comment(readers_comment.id).await.unwrap().is_none());
    assert_eq!(repo.count_likes(admins_post.id).await.unwrap(), 0);

    let stats = repo.get_stats().await.unwrap();
    assert_eq!(stats.total_users, 2);
    assert_eq!(stats.total_posts, 1);
    assert_eq!(stats.total_comments, 0);
    assert_eq!(stats.total_likes, 0);

    assert!(!repo.delete_user(author.id).await.unwrap());
}
