//! Authentication and authorization for the gateway.
//!
//! This module provides:
//! - A credential store of users, roles and role memberships
//! - JWT issuance and validation with header-or-cookie transport
//! - A pure access-control gate over role claims
//! - Idempotent bootstrap of the required roles and administrator
//! - Axum extractors for protected routes

mod config;
mod gate;
mod jwt;
mod middleware;
/// Startup seeding of roles and the administrator account.
pub mod setup;
mod store;
mod transport;
mod users;

pub use config::{AuthConfig, AuthConfigBuilder};
pub use gate::{Decision, authorize};
pub use jwt::{Claims, IssuedToken, JwtKeys, TokenIssuer, TokenValidator};
pub use middleware::{
    AdminRole, AuthState, LoginOutcome, RequireAdmin, RequireAuth, RequireRoles, RoleRequirement,
};
pub use setup::{SeedReport, seed};
pub use store::{CredentialStore, Ensured, SledCredentialStore};
pub use transport::{access_cookie, clear_cookie, extract_token};
pub use users::{NewUser, PublicUser, Role, RoleMembership, User, hash_password, verify_password};

use thiserror::Error;

/// Why a bearer credential was not accepted.
///
/// Every variant collapses to the same unauthenticated response; the
/// distinction only reaches internal diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenRejection {
    /// No token in the `Authorization` header or the access-token cookie.
    #[error("no token presented")]
    Missing,

    /// Token could not be decoded.
    #[error("malformed token")]
    Malformed,

    /// Signature does not match the server key.
    #[error("bad signature")]
    BadSignature,

    /// Issuer or audience differs from configuration.
    #[error("wrong issuer or audience")]
    WrongIssuerOrAudience,

    /// Token is at or past its expiry instant.
    #[error("token expired")]
    Expired,
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Login failed. Deliberately silent about which check failed.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Token missing or rejected by the validator.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(TokenRejection),

    /// Token is valid but its subject is disabled or gone (live re-check).
    #[error("Account unavailable")]
    AccountUnavailable,

    /// Authenticated, but none of the required roles are held.
    #[error("Insufficient role")]
    InsufficientRole,

    /// Too many login attempts.
    #[error("Too many login attempts")]
    RateLimited,

    /// User not found.
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// User already exists.
    #[error("User already exists: {0}")]
    UserExists(String),

    /// Role not found.
    #[error("Role not found: {0}")]
    RoleNotFound(String),

    /// Role already exists.
    #[error("Role already exists: {0}")]
    RoleExists(String),

    /// Caller supplied invalid input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Token could not be built or signed.
    #[error("Token error: {0}")]
    TokenIssue(String),

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Background task failed.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Whether this error maps to a 401 response.
    #[must_use]
    pub const fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials | Self::Unauthenticated(_) | Self::AccountUnavailable
        )
    }
}

impl From<TokenRejection> for AuthError {
    fn from(reason: TokenRejection) -> Self {
        Self::Unauthenticated(reason)
    }
}

impl From<ripperdoc_core::ValidationError> for AuthError {
    fn from(e: ripperdoc_core::ValidationError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<sled::Error> for AuthError {
    fn from(e: sled::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
