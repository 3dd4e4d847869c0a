/// Router Module Index
///
/// Routing is split by access level so the authentication layer is applied
/// per module rather than per handler.

/// Routes open to anonymous clients: session endpoints and read-only content.
pub mod public;

/// Routes behind the `AuthUser` layer. Role and ownership checks happen in the
/// core operations each handler calls.
pub mod authenticated;

/// Moderation routes, nested under `/admin`. Authenticated by the same layer;
/// the Administer capability is checked per operation.
pub mod admin;
