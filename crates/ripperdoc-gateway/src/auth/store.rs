//! Credential store: users, roles and role memberships.

use std::path::Path;

use chrono::Utc;
use ripperdoc_core::validation::validate_role_name;
use ripperdoc_core::{RoleId, RoleName, RoleSet, UserId, canonical_email};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sled::Transactional;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
};

use super::AuthError;
use super::users::{NewUser, Role, RoleMembership, User, verify_password};

/// Outcome of an idempotent create-or-fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ensured<T> {
    /// The record did not exist and was inserted.
    Created(T),
    /// The record already existed and was left untouched.
    Existing(T),
}

impl<T> Ensured<T> {
    /// Whether this call inserted the record.
    #[must_use]
    pub const fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    /// Unwrap the record regardless of outcome.
    #[must_use]
    pub fn into_inner(self) -> T {
        match self {
            Self::Created(v) | Self::Existing(v) => v,
        }
    }
}

/// Persistence capability consumed by login, validation and seeding.
///
/// Every operation either completes or leaves the store untouched.
/// Uniqueness of emails and role names is enforced by the store itself,
/// so concurrent inserts of the same key fail with `UserExists` or
/// `RoleExists` instead of producing duplicates.
pub trait CredentialStore: Send + Sync {
    /// Look up a user by email (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError>;

    /// Look up a user by ID.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, AuthError>;

    /// Names of all roles the user currently holds.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn list_roles(&self, id: UserId) -> Result<RoleSet, AuthError>;

    /// Look up a role by exact name.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn find_role_by_name(&self, name: &RoleName) -> Result<Option<Role>, AuthError>;

    /// Insert a new role.
    ///
    /// # Errors
    ///
    /// Returns `RoleExists` if the name is taken.
    fn insert_role(&self, name: &RoleName) -> Result<Role, AuthError>;

    /// Insert a new user together with its role memberships.
    ///
    /// # Errors
    ///
    /// Returns `UserExists` if the email is taken, `RoleNotFound` if any
    /// requested role is missing. Nothing is written in either case.
    fn insert_user(&self, new_user: &NewUser) -> Result<User, AuthError>;

    /// All users, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn list_users(&self) -> Result<Vec<User>, AuthError>;

    /// Soft-disable or re-enable a user.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` if the user does not exist.
    fn set_disabled(&self, id: UserId, disabled: bool) -> Result<User, AuthError>;

    /// Grant an existing role. Returns `false` if the user already held it.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` or `RoleNotFound`.
    fn assign_role(&self, id: UserId, role: &RoleName) -> Result<bool, AuthError>;

    /// Stamp the user's last successful login.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` if the user does not exist.
    fn record_login(&self, id: UserId) -> Result<(), AuthError>;

    /// Check a plaintext password against the user's stored hash.
    fn verify_password(&self, user: &User, plaintext: &str) -> bool {
        verify_password(plaintext, &user.password_hash)
    }

    /// Create the role, or fetch it if another writer got there first.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn ensure_role(&self, name: &RoleName) -> Result<Ensured<Role>, AuthError> {
        match self.insert_role(name) {
            Ok(role) => Ok(Ensured::Created(role)),
            Err(AuthError::RoleExists(_)) => self
                .find_role_by_name(name)?
                .map(Ensured::Existing)
                .ok_or_else(|| AuthError::Storage(format!("role {name} conflicted but is missing"))),
            Err(e) => Err(e),
        }
    }

    /// Create the user, or fetch the existing one keyed by email.
    ///
    /// An existing user is returned as-is: neither its password nor its
    /// roles are touched.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails or a requested role is missing.
    fn ensure_user(&self, new_user: &NewUser) -> Result<Ensured<User>, AuthError> {
        match self.insert_user(new_user) {
            Ok(user) => Ok(Ensured::Created(user)),
            Err(AuthError::UserExists(_)) => self
                .find_user_by_email(&new_user.email)?
                .map(Ensured::Existing)
                .ok_or_else(|| {
                    AuthError::Storage(format!("user {} conflicted but is missing", new_user.email))
                }),
            Err(e) => Err(e),
        }
    }
}

type TxResult<T> = ConflictableTransactionResult<T, AuthError>;

/// Sled-backed credential store.
#[derive(Clone)]
pub struct SledCredentialStore {
    db: sled::Db,
    users: sled::Tree,
    users_by_email: sled::Tree,
    roles: sled::Tree,
    roles_by_name: sled::Tree,
    user_roles: sled::Tree,
}

impl SledCredentialStore {
    /// Open or create a store under `path`.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, AuthError> {
        // Writes flush explicitly; without the background flusher the file
        // lock is released as soon as the last handle drops.
        let db = sled::Config::new()
            .path(path.join("credentials"))
            .flush_every_ms(None)
            .open()
            .map_err(|e| AuthError::Storage(format!("Failed to open credential database: {e}")))?;
        Self::with_db(db)
    }

    /// Create a store over an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns error if a tree cannot be opened.
    pub fn with_db(db: sled::Db) -> Result<Self, AuthError> {
        let open = |name: &str| {
            db.open_tree(name)
                .map_err(|e| AuthError::Storage(format!("Failed to open {name} tree: {e}")))
        };

        Ok(Self {
            users: open("users")?,
            users_by_email: open("users_by_email")?,
            roles: open("roles")?,
            roles_by_name: open("roles_by_name")?,
            user_roles: open("user_roles")?,
            db,
        })
    }

    /// Number of stored users.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    fn flush(&self) -> Result<(), AuthError> {
        self.db
            .flush()
            .map_err(|e| AuthError::Storage(format!("Flush error: {e}")))?;
        Ok(())
    }

    /// Overwrite a user record directly, bypassing uniqueness checks.
    #[cfg(test)]
    pub(crate) fn put_user(&self, user: &User) {
        self.users
            .insert(user.id.0.as_bytes(), encode(user).unwrap())
            .unwrap();
    }

    fn role_by_id(&self, id: RoleId) -> Result<Option<Role>, AuthError> {
        self.roles
            .get(id.0.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }
}

impl std::fmt::Debug for SledCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledCredentialStore")
            .field("users", &self.users.len())
            .field("roles", &self.roles.len())
            .finish_non_exhaustive()
    }
}

impl CredentialStore for SledCredentialStore {
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let Some(id) = self.users_by_email.get(email_key(email))? else {
            return Ok(None);
        };
        self.users.get(id)?.map(|bytes| decode(&bytes)).transpose()
    }

    fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, AuthError> {
        self.users
            .get(id.0.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn list_roles(&self, id: UserId) -> Result<RoleSet, AuthError> {
        let mut names = RoleSet::new();
        for entry in self.user_roles.scan_prefix(id.0.as_bytes()) {
            let (key, _) = entry?;
            let Some(membership) = RoleMembership::from_key(&key) else {
                return Err(AuthError::Storage("corrupt membership key".to_string()));
            };
            if let Some(role) = self.role_by_id(membership.role_id)? {
                names.insert(role.name);
            }
        }
        Ok(names)
    }

    fn find_role_by_name(&self, name: &RoleName) -> Result<Option<Role>, AuthError> {
        let Some(id) = self.roles_by_name.get(name.as_str())? else {
            return Ok(None);
        };
        self.roles.get(id)?.map(|bytes| decode(&bytes)).transpose()
    }

    fn insert_role(&self, name: &RoleName) -> Result<Role, AuthError> {
        validate_role_name(name.as_str())?;
        let role = Role::new(name.clone());
        let value = encode(&role)?;

        let result = (&self.roles, &self.roles_by_name).transaction(|(roles, by_name)| -> TxResult<()> {
            if by_name.get(role.name.as_str())?.is_some() {
                return Err(ConflictableTransactionError::Abort(AuthError::RoleExists(
                    role.name.to_string(),
                )));
            }
            roles.insert(role.id.0.as_bytes().as_slice(), value.as_slice())?;
            by_name.insert(role.name.as_str(), role.id.0.as_bytes().as_slice())?;
            Ok(())
        });
        map_tx(result)?;
        self.flush()?;

        tracing::debug!(role = %role.name, role_id = %role.id, "Inserted role");
        Ok(role)
    }

    fn insert_user(&self, new_user: &NewUser) -> Result<User, AuthError> {
        let email = email_key(&new_user.email);
        let user = User::new(email.clone(), new_user.password_hash.clone());
        let value = encode(&user)?;

        let result = (
            &self.users,
            &self.users_by_email,
            &self.roles_by_name,
            &self.user_roles,
        )
            .transaction(|(users, by_email, roles_by_name, memberships)| -> TxResult<()> {
                if by_email.get(email.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(AuthError::UserExists(
                        email.clone(),
                    )));
                }

                let mut role_ids = Vec::with_capacity(new_user.roles.len());
                for name in &new_user.roles {
                    let Some(id) = roles_by_name.get(name.as_str())? else {
                        return Err(ConflictableTransactionError::Abort(AuthError::RoleNotFound(
                            name.to_string(),
                        )));
                    };
                    role_ids.push(id);
                }

                users.insert(user.id.0.as_bytes().as_slice(), value.as_slice())?;
                by_email.insert(email.as_bytes(), user.id.0.as_bytes().as_slice())?;
                for id in role_ids {
                    let Some(role_id) = uuid_from_ivec(&id) else {
                        return Err(ConflictableTransactionError::Abort(AuthError::Storage(
                            "corrupt role index".to_string(),
                        )));
                    };
                    let membership = RoleMembership {
                        user_id: user.id,
                        role_id: RoleId(role_id),
                    };
                    memberships.insert(membership.key(), sled::IVec::default())?;
                }
                Ok(())
            });
        map_tx(result)?;
        self.flush()?;

        tracing::debug!(user_id = %user.id, email = %user.email, "Inserted user");
        Ok(user)
    }

    fn list_users(&self) -> Result<Vec<User>, AuthError> {
        self.users
            .iter()
            .map(|entry| {
                let (_, value) = entry?;
                decode(&value)
            })
            .collect()
    }

    fn set_disabled(&self, id: UserId, disabled: bool) -> Result<User, AuthError> {
        let user = update_user(&self.users, id, |user| user.disabled = disabled)?;
        self.flush()?;
        tracing::info!(user_id = %id, disabled, "Updated account status");
        Ok(user)
    }

    fn assign_role(&self, id: UserId, role: &RoleName) -> Result<bool, AuthError> {
        let result = (&self.users, &self.roles_by_name, &self.user_roles).transaction(
            |(users, roles_by_name, memberships)| -> TxResult<bool> {
                if users.get(id.0.as_bytes())?.is_none() {
                    return Err(ConflictableTransactionError::Abort(AuthError::UserNotFound(
                        id.to_string(),
                    )));
                }
                let Some(role_id) = roles_by_name
                    .get(role.as_str())?
                    .as_deref()
                    .and_then(uuid_from_ivec)
                else {
                    return Err(ConflictableTransactionError::Abort(AuthError::RoleNotFound(
                        role.to_string(),
                    )));
                };
                let membership = RoleMembership {
                    user_id: id,
                    role_id: RoleId(role_id),
                };
                Ok(memberships
                    .insert(membership.key(), sled::IVec::default())?
                    .is_none())
            },
        );
        let granted = map_tx(result)?;
        self.flush()?;

        if granted {
            tracing::info!(user_id = %id, role = %role, "Granted role");
        }
        Ok(granted)
    }

    fn record_login(&self, id: UserId) -> Result<(), AuthError> {
        update_user(&self.users, id, |user| user.last_login = Some(Utc::now()))?;
        self.flush()
    }
}

/// Read-modify-write of a single user record inside a transaction.
fn update_user(
    users: &sled::Tree,
    id: UserId,
    apply: impl Fn(&mut User),
) -> Result<User, AuthError> {
    let result = users.transaction(|tx| -> TxResult<User> {
        let Some(bytes) = tx.get(id.0.as_bytes())? else {
            return Err(ConflictableTransactionError::Abort(AuthError::UserNotFound(
                id.to_string(),
            )));
        };
        let mut user: User = decode(&bytes).map_err(ConflictableTransactionError::Abort)?;
        apply(&mut user);
        let value = encode(&user).map_err(ConflictableTransactionError::Abort)?;
        tx.insert(id.0.as_bytes().as_slice(), value)?;
        Ok(user)
    });
    map_tx(result)
}

fn email_key(email: &str) -> String {
    canonical_email(email)
}

fn uuid_from_ivec(bytes: &[u8]) -> Option<uuid::Uuid> {
    uuid::Uuid::from_slice(bytes).ok()
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, AuthError> {
    serde_json::to_vec(value).map_err(|e| AuthError::Storage(format!("Serialization error: {e}")))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, AuthError> {
    serde_json::from_slice(bytes)
        .map_err(|e| AuthError::Storage(format!("Deserialization error: {e}")))
}

fn map_tx<T>(result: Result<T, TransactionError<AuthError>>) -> Result<T, AuthError> {
    result.map_err(|e| match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => AuthError::Storage(format!("Transaction error: {e}")),
    })
}
