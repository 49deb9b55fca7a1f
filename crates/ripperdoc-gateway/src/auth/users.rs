//! User and role records.

use std::sync::LazyLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use ripperdoc_core::{RoleId, RoleName, RoleSet, UserId};
use serde::{Deserialize, Serialize};

use super::AuthError;

/// User account.
///
/// Roles are not stored on the record; they live in the membership relation
/// and are read through [`CredentialStore::list_roles`](super::CredentialStore::list_roles).
#[derive(Clone, Serialize, Deserialize)]
pub struct User {
    /// Immutable user ID.
    pub id: UserId,
    /// Normalized (lower-cased) email, unique across users.
    pub email: String,
    /// Argon2id PHC hash. Never exposed in public API.
    pub password_hash: String,
    /// Disabled users cannot log in.
    #[serde(default)]
    pub disabled: bool,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user last logged in.
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    /// Create a new, enabled user record with a fresh ID.
    #[must_use]
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id: UserId::generate(),
            email: email.into(),
            password_hash: password_hash.into(),
            disabled: false,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    /// Create a safe version of user for API responses.
    #[must_use]
    pub fn to_public(&self, roles: RoleSet) -> PublicUser {
        PublicUser {
            id: self.id,
            email: self.email.clone(),
            roles,
            disabled: self.disabled,
            created_at: self.created_at,
            last_login: self.last_login,
        }
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("disabled", &self.disabled)
            .field("created_at", &self.created_at)
            .field("last_login", &self.last_login)
            .finish_non_exhaustive()
    }
}

/// Public user representation (for API responses).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    /// User ID.
    pub id: UserId,
    /// Email address.
    pub email: String,
    /// Current role memberships.
    pub roles: RoleSet,
    /// Whether the account is disabled.
    pub disabled: bool,
    /// When created.
    pub created_at: DateTime<Utc>,
    /// Last login time.
    pub last_login: Option<DateTime<Utc>>,
}

/// Input for creating a user.
#[derive(Clone)]
pub struct NewUser {
    /// Email; matched case-insensitively.
    pub email: String,
    /// Pre-computed password hash.
    pub password_hash: String,
    /// Roles to grant on creation. Each must already exist.
    pub roles: RoleSet,
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("email", &self.email)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

/// Role record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role ID.
    pub id: RoleId,
    /// Unique, immutable role name.
    pub name: RoleName,
}

impl Role {
    /// Create a role with a fresh ID.
    #[must_use]
    pub fn new(name: RoleName) -> Self {
        Self {
            id: RoleId::generate(),
            name,
        }
    }
}

/// Join between a user and a role.
///
/// Has no lifecycle of its own; the pair is the whole record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleMembership {
    /// Member.
    pub user_id: UserId,
    /// Granted role.
    pub role_id: RoleId,
}

impl RoleMembership {
    /// Storage key: user ID bytes followed by role ID bytes, so a prefix
    /// scan on the user ID yields all of a user's memberships.
    #[must_use]
    pub fn key(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(32);
        key.extend_from_slice(self.user_id.0.as_bytes());
        key.extend_from_slice(self.role_id.0.as_bytes());
        key
    }

    /// Decode a storage key.
    #[must_use]
    pub fn from_key(key: &[u8]) -> Option<Self> {
        let user: [u8; 16] = key.get(..16)?.try_into().ok()?;
        let role: [u8; 16] = key.get(16..32)?.try_into().ok()?;
        Some(Self {
            user_id: UserId(uuid::Uuid::from_bytes(user)),
            role_id: RoleId(uuid::Uuid::from_bytes(role)),
        })
    }
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns error if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Config(format!("Password hashing failed: {e}")))
}

/// Verify a password against a hash. An unparseable hash never verifies.
#[must_use]
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Hash checked when a login names an unknown email, so the response time
/// does not reveal whether the account exists.
static DUMMY_HASH: LazyLock<String> =
    LazyLock::new(|| hash_password("ripperdoc-timing-equalizer").unwrap_or_default());

/// Burn one verification against a throwaway hash.
pub(crate) fn verify_dummy(password: &str) {
    let _ = verify_password(password, &DUMMY_HASH);
}
