/// Router Module Index
///
/// Organizes the routing logic into security-segregated modules, so access
/// control is applied explicitly per module (via Axum layers) and protected
/// endpoints cannot be exposed by accident.

/// Routes accessible to all clients (health only).
pub mod public;

/// Routes protected by the `AuthUser` extractor middleware.
/// Requires a validated user session.
pub mod authenticated;

/// Routes restricted to users with the 'admin' role.
/// The role check runs inside each handler.
pub mod admin;
