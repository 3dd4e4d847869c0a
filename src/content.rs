//! Content operations over posts, comments and likes.
//!
//! Every mutation is authorize, then one store write. A failed check leaves
//! nothing behind.

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{AdminDashboardStats, Comment, CommentRequest, LikeState, Post, PostDetail, PostRequest, User},
    policy::{self, Capability},
    repository::Repository,
};

async fn load_post(repo: &dyn Repository, post_id: Uuid) -> AppResult<Post> {
    repo.get_post(post_id).await?.ok_or(AppError::NotFound("Post"))
}

async fn load_comment(repo: &dyn Repository, comment_id: i64) -> AppResult<Comment> {
    repo.get_comment(comment_id)
        .await?
        .ok_or(AppError::NotFound("Comment"))
}

// --- Reads ---

pub async fn list_posts(repo: &dyn Repository) -> AppResult<Vec<Post>> {
    repo.list_posts().await
}

/// The post with its comments, like count and whether `viewer` liked it.
pub async fn post_detail(
    repo: &dyn Repository,
    viewer: Option<&User>,
    post_id: Uuid,
) -> AppResult<PostDetail> {
    let post = load_post(repo, post_id).await?;
    let comments = repo.list_comments(post_id).await?;
    let likes = repo.count_likes(post_id).await?;
    let liked_by_viewer = match viewer {
        Some(user) => repo.has_liked(user.id, post_id).await?,
        None => false,
    };

    Ok(PostDetail {
        post,
        comments,
        likes,
        liked_by_viewer,
    })
}

pub async fn list_comments(repo: &dyn Repository, post_id: Uuid) -> AppResult<Vec<Comment>> {
    load_post(repo, post_id).await?;
    repo.list_comments(post_id).await
}

// --- Posts ---

pub async fn create_post(repo: &dyn Repository, actor: &User, req: PostRequest) -> AppResult<Post> {
    policy::require(actor, Capability::WritePosts)?;
    req.validate()?;

    let post = repo.create_post(actor.id, req).await?;
    tracing::info!(post_id = %post.id, author_id = %actor.id, "published post");
    Ok(post)
}

/// edit_post
///
/// Owner or admin, and the actor must still be able to write posts: an author
/// demoted to `user` keeps delete rights on old posts but cannot edit them.
pub async fn edit_post(
    repo: &dyn Repository,
    actor: &User,
    post_id: Uuid,
    req: PostRequest,
) -> AppResult<Post> {
    let post = load_post(repo, post_id).await?;
    policy::require(actor, Capability::WritePosts)?;
    policy::require_owner_or_admin(actor, post.author_id)?;
    req.validate()?;

    repo.update_post(post_id, req)
        .await?
        .ok_or(AppError::NotFound("Post"))
}

pub async fn delete_post(repo: &dyn Repository, actor: &User, post_id: Uuid) -> AppResult<()> {
    let post = load_post(repo, post_id).await?;
    policy::require_owner_or_admin(actor, post.author_id)?;

    if !repo.delete_post(post_id).await? {
        return Err(AppError::NotFound("Post"));
    }
    tracing::info!(%post_id, actor_id = %actor.id, "deleted post");
    Ok(())
}

/// Moderation path: any post, admins only.
pub async fn admin_delete_post(repo: &dyn Repository, actor: &User, post_id: Uuid) -> AppResult<()> {
    policy::require(actor, Capability::Administer)?;

    if !repo.delete_post(post_id).await? {
        return Err(AppError::NotFound("Post"));
    }
    tracing::info!(%post_id, admin_id = %actor.id, "admin deleted post");
    Ok(())
}

pub async fn admin_list_posts(repo: &dyn Repository, actor: &User) -> AppResult<Vec<Post>> {
    policy::require(actor, Capability::Administer)?;
    repo.list_posts().await
}

pub async fn admin_stats(repo: &dyn Repository, actor: &User) -> AppResult<AdminDashboardStats> {
    policy::require(actor, Capability::Administer)?;
    repo.get_stats().await
}

// --- Comments ---

pub async fn add_comment(
    repo: &dyn Repository,
    actor: &User,
    post_id: Uuid,
    req: CommentRequest,
) -> AppResult<Comment> {
    load_post(repo, post_id).await?;
    policy::require(actor, Capability::CommentOrLike)?;
    req.validate()?;

    let mut comment = repo
        .add_comment(post_id, actor.id, req.body.trim().to_string())
        .await?;
    comment.author_username = Some(actor.username.clone());
    Ok(comment)
}

pub async fn edit_comment(
    repo: &dyn Repository,
    actor: &User,
    comment_id: i64,
    req: CommentRequest,
) -> AppResult<Comment> {
    let comment = load_comment(repo, comment_id).await?;
    policy::require_owner_or_admin(actor, comment.author_id)?;
    req.validate()?;

    let mut updated = repo
        .update_comment(comment_id, req.body.trim().to_string())
        .await?
        .ok_or(AppError::NotFound("Comment"))?;
    updated.author_username = comment.author_username;
    Ok(updated)
}

pub async fn delete_comment(repo: &dyn Repository, actor: &User, comment_id: i64) -> AppResult<()> {
    let comment = load_comment(repo, comment_id).await?;
    policy::require_owner_or_admin(actor, comment.author_id)?;

    if !repo.delete_comment(comment_id).await? {
        return Err(AppError::NotFound("Comment"));
    }
    Ok(())
}

// --- Likes ---

/// toggle_like
///
/// Likes the post if the actor has not, unlikes it otherwise. Two calls in a
/// row leave the post as it was.
pub async fn toggle_like(repo: &dyn Repository, actor: &User, post_id: Uuid) -> AppResult<LikeState> {
    load_post(repo, post_id).await?;
    policy::require(actor, Capability::CommentOrLike)?;

    let liked = repo.toggle_like(actor.id, post_id).await?;
    let likes = repo.count_likes(post_id).await?;
    Ok(LikeState { liked, likes })
}
