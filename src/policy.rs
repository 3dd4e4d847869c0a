//! Authorization policy.
//!
//! Pure decisions over (actor role, actor identity, resource owner). Each role
//! carries an explicit capability set; no role implies another's capabilities.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Role, User},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    WritePosts,
    CommentOrLike,
    Administer,
}

/// The capability table. Every role is listed; membership is the only test.
pub const fn capabilities(role: Role) -> &'static [Capability] {
    match role {
        Role::User => &[Capability::CommentOrLike],
        Role::Author => &[Capability::WritePosts],
        Role::Admin => &[
            Capability::WritePosts,
            Capability::CommentOrLike,
            Capability::Administer,
        ],
    }
}

pub fn has_capability(role: Role, capability: Capability) -> bool {
    capabilities(role).contains(&capability)
}

pub fn can_write_posts(role: Role) -> bool {
    has_capability(role, Capability::WritePosts)
}

pub fn can_comment_or_like(role: Role) -> bool {
    has_capability(role, Capability::CommentOrLike)
}

pub fn is_admin(role: Role) -> bool {
    has_capability(role, Capability::Administer)
}

/// Resource rule for posts and comments: the owner or an admin.
pub fn can_modify(actor: &User, owner_id: Uuid) -> bool {
    actor.id == owner_id || is_admin(actor.role)
}

// --- Guards returning the error callers surface ---

pub fn require(actor: &User, capability: Capability) -> AppResult<()> {
    if has_capability(actor.role, capability) {
        return Ok(());
    }
    let message = match capability {
        Capability::WritePosts => "Only authors can write posts.",
        Capability::CommentOrLike => "Only users can like and comment on posts.",
        Capability::Administer => "Administrator access required.",
    };
    tracing::warn!(user_id = %actor.id, role = %actor.role, ?capability, "capability denied");
    Err(AppError::Forbidden(message.to_string()))
}

pub fn require_owner_or_admin(actor: &User, owner_id: Uuid) -> AppResult<()> {
    if can_modify(actor, owner_id) {
        return Ok(());
    }
    tracing::warn!(user_id = %actor.id, %owner_id, "ownership check failed");
    Err(AppError::Forbidden(
        "You can only change your own content.".to_string(),
    ))
}

/// Admins may not strip their own admin role. Removing the last admin through
/// another admin is allowed.
pub fn check_role_change(actor: &User, target_id: Uuid, new_role: Role) -> AppResult<()> {
    require(actor, Capability::Administer)?;
    if actor.id == target_id && !is_admin(new_role) {
        return Err(AppError::Forbidden(
            "You cannot remove your own admin role.".to_string(),
        ));
    }
    Ok(())
}

pub fn check_user_deletion(actor: &User, target_id: Uuid) -> AppResult<()> {
    require(actor, Capability::Administer)?;
    if actor.id == target_id {
        return Err(AppError::Forbidden(
            "You cannot delete your own admin account.".to_string(),
        ));
    }
    Ok(())
}

/// Gate for the role requested at registration.
///
/// `admin` needs a configured registration token and a matching presented one.
/// Both sides are trimmed; a blank configured token disables admin sign-up.
pub fn check_registration_role(
    requested: Role,
    presented_token: Option<&str>,
    configured_token: Option<&str>,
) -> AppResult<()> {
    if !is_admin(requested) {
        return Ok(());
    }

    let expected = configured_token.map(str::trim).unwrap_or_default();
    if expected.is_empty() {
        return Err(AppError::Forbidden(
            "Admin registration is disabled on this server.".to_string(),
        ));
    }

    let provided = presented_token.map(str::trim).unwrap_or_default();
    if !tokens_match(provided, expected) {
        return Err(AppError::Forbidden(
            "Invalid admin registration token.".to_string(),
        ));
    }
    Ok(())
}

type HmacSha256 = Hmac<Sha256>;

const TOKEN_MAC_KEY: &[u8] = b"blog-portal/admin-registration-token";

/// Constant-time token comparison. Both inputs are MACed to fixed-length tags
/// first so neither content nor length leaks through timing.
fn tokens_match(provided: &str, expected: &str) -> bool {
    let Ok(mut expected_mac) = HmacSha256::new_from_slice(TOKEN_MAC_KEY) else {
        return false;
    };
    expected_mac.update(expected.as_bytes());
    let expected_tag = expected_mac.finalize().into_bytes();

    let Ok(mut provided_mac) = HmacSha256::new_from_slice(TOKEN_MAC_KEY) else {
        return false;
    };
    provided_mac.update(provided.as_bytes());
    provided_mac.verify_slice(&expected_tag).is_ok()
}
