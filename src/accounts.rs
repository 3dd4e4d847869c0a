//! Account operations: local registration and sign-in, admin role changes and
//! account removal. Each call authorizes first and then performs a single write.

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, ConflictKind},
    models::{LoginRequest, NewUser, RegisterRequest, Role, User, normalize_email},
    policy::{self, Capability},
    repository::Repository,
};

/// register
///
/// Validates the form, gates the requested role (admin needs the configured
/// token), then inserts. A duplicate username or email, whether seen by the
/// pre-check or by the unique index, is a `Conflict`.
pub async fn register(
    repo: &dyn Repository,
    admin_registration_token: Option<&str>,
    req: RegisterRequest,
) -> AppResult<User> {
    let role = req.validate()?;
    policy::check_registration_role(role, req.admin_token.as_deref(), admin_registration_token)?;

    let email = normalize_email(&req.email);
    if repo.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict(ConflictKind::Email));
    }
    if repo.find_user_by_username(&req.username).await?.is_some() {
        return Err(AppError::Conflict(ConflictKind::Username));
    }

    let mut new_user = NewUser {
        username: req.username,
        email,
        role,
        ..NewUser::default()
    };
    new_user.set_password(&req.password)?;

    let user = repo.create_user(new_user).await?;
    tracing::info!(user_id = %user.id, role = %user.role, "registered account");
    Ok(user)
}

/// login
///
/// Unknown email, external-only account and wrong password all fail the same way.
pub async fn login(repo: &dyn Repository, req: LoginRequest) -> AppResult<User> {
    let invalid = || AppError::Unauthenticated("Invalid email or password.".to_string());

    let user = repo
        .find_user_by_email(&normalize_email(&req.email))
        .await?
        .ok_or_else(invalid)?;

    if !user.check_password(&req.password) {
        tracing::info!(user_id = %user.id, "failed password sign-in");
        return Err(invalid());
    }
    Ok(user)
}

pub async fn list_users(repo: &dyn Repository, actor: &User) -> AppResult<Vec<User>> {
    policy::require(actor, Capability::Administer)?;
    repo.list_users().await
}

/// set_user_role
///
/// Admin only. An admin may not drop their own admin role; nothing stops one
/// admin from demoting another, including the last other admin.
pub async fn set_user_role(
    repo: &dyn Repository,
    actor: &User,
    target_id: Uuid,
    role: Role,
) -> AppResult<User> {
    policy::check_role_change(actor, target_id, role)?;

    let user = repo
        .set_user_role(target_id, role)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    tracing::info!(admin_id = %actor.id, user_id = %user.id, %role, "changed role");
    Ok(user)
}

/// delete_user
///
/// Admin only, never the caller's own account. Cascades to everything the user owns.
pub async fn delete_user(repo: &dyn Repository, actor: &User, target_id: Uuid) -> AppResult<()> {
    policy::check_user_deletion(actor, target_id)?;

    if !repo.delete_user(target_id).await? {
        return Err(AppError::NotFound("User"));
    }
    tracing::info!(admin_id = %actor.id, user_id = %target_id, "deleted user");
    Ok(())
}
