//! Startup seeding of required roles and the administrator account.

use ripperdoc_core::{RoleName, SecretValue, UserId, normalize_email, role_set};
use serde::Serialize;

use super::AuthError;
use super::store::CredentialStore;
use super::users::{NewUser, hash_password};

/// What a seeding run changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedReport {
    /// Roles that did not exist before this run.
    pub roles_created: Vec<RoleName>,
    /// Whether the administrator account was created by this run.
    pub admin_created: bool,
    /// The administrator's user ID.
    pub admin_id: UserId,
}

/// Ensure the required roles and the administrator account exist.
///
/// Safe to run on every start and after a crash part-way through a
/// previous run. An existing administrator keeps its password and roles.
///
/// # Errors
///
/// Returns `Config` if the email or password is blank or the email is
/// invalid, and any storage error. Callers must treat both as fatal.
pub fn seed(
    store: &dyn CredentialStore,
    admin_email: &str,
    admin_password: &SecretValue,
) -> Result<SeedReport, AuthError> {
    if admin_email.trim().is_empty() {
        return Err(AuthError::Config("Admin email is required".to_string()));
    }
    if admin_password.is_blank() {
        return Err(AuthError::Config("Admin password is required".to_string()));
    }
    let email = normalize_email(admin_email)
        .map_err(|e| AuthError::Config(format!("Admin email is invalid: {e}")))?;

    let mut roles_created = Vec::new();
    for name in RoleName::required() {
        if store.ensure_role(&name)?.was_created() {
            tracing::info!(role = %name, "Created role");
            roles_created.push(name);
        }
    }

    let admin = store.ensure_user(&NewUser {
        email,
        password_hash: hash_password(admin_password.expose())?,
        roles: role_set([RoleName::ADMIN]),
    })?;
    let admin_created = admin.was_created();
    let admin = admin.into_inner();

    if admin_created {
        tracing::info!(user_id = %admin.id, email = %admin.email, "Created administrator");
    } else {
        tracing::info!(user_id = %admin.id, "Administrator already present");
    }

    Ok(SeedReport {
        roles_created,
        admin_created,
        admin_id: admin.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::SledCredentialStore;
    use tempfile::TempDir;

    fn store() -> (TempDir, SledCredentialStore) {
        let dir = TempDir::new().unwrap();
        let store = SledCredentialStore::open(dir.path()).unwrap();
        (dir, store)
    }

    fn password() -> SecretValue {
        SecretValue::from("initial-admin-pass")
    }

    #[test]
    fn test_first_run_creates_everything() {
        let (_dir, store) = store();
        let report = seed(&store, "Admin@Ripperdoc.shop", &password()).unwrap();

        assert_eq!(report.roles_created, RoleName::required().to_vec());
        assert!(report.admin_created);

        let admin = store.find_user_by_email("admin@ripperdoc.shop").unwrap().unwrap();
        assert_eq!(admin.id, report.admin_id);
        assert!(store.verify_password(&admin, "initial-admin-pass"));
        assert_eq!(store.list_roles(admin.id).unwrap(), role_set(["Admin"]));
    }

    #[test]
    fn test_second_run_is_noop() {
        let (_dir, store) = store();
        let first = seed(&store, "admin@ripperdoc.shop", &password()).unwrap();
        let second = seed(&store, "admin@ripperdoc.shop", &password()).unwrap();

        assert!(second.roles_created.is_empty());
        assert!(!second.admin_created);
        assert_eq!(first.admin_id, second.admin_id);
        assert_eq!(store.list_users().unwrap().len(), 1);
    }

    #[test]
    fn test_rotated_password_survives_restart() {
        let (_dir, store) = store();
        seed(&store, "admin@ripperdoc.shop", &password()).unwrap();

        // Operator rotates the password out of band, then the process restarts.
        let admin = store.find_user_by_email("admin@ripperdoc.shop").unwrap().unwrap();
        let rotated = crate::auth::users::User {
            password_hash: hash_password("rotated-password").unwrap(),
            ..admin
        };
        store.insert_role(&RoleName::new("Support")).unwrap();
        store.assign_role(rotated.id, &RoleName::new("Support")).unwrap();
        store.put_user(&rotated);

        seed(&store, "admin@ripperdoc.shop", &password()).unwrap();

        let admin = store.find_user_by_email("admin@ripperdoc.shop").unwrap().unwrap();
        assert!(store.verify_password(&admin, "rotated-password"));
        assert!(!store.verify_password(&admin, "initial-admin-pass"));
        assert_eq!(store.list_roles(admin.id).unwrap(), role_set(["Admin", "Support"]));
    }

    #[test]
    fn test_resumes_after_partial_run() {
        let (_dir, store) = store();
        // A previous run died after creating only one role.
        store.insert_role(&RoleName::admin()).unwrap();

        let report = seed(&store, "admin@ripperdoc.shop", &password()).unwrap();
        assert_eq!(report.roles_created, vec![RoleName::customer()]);
        assert!(report.admin_created);
    }

    #[test]
    fn test_concurrent_seeding_creates_one_admin() {
        let (_dir, store) = store();
        let store = std::sync::Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    seed(store.as_ref(), "admin@ripperdoc.shop", &password())
                })
            })
            .collect();
        let reports: Vec<SeedReport> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();

        assert_eq!(reports.iter().filter(|r| r.admin_created).count(), 1);
        assert!(reports.iter().all(|r| r.admin_id == reports[0].admin_id));
        let roles_created: usize = reports.iter().map(|r| r.roles_created.len()).sum();
        assert_eq!(roles_created, RoleName::required().len());
        assert_eq!(store.list_users().unwrap().len(), 1);
    }

    #[test]
    fn test_blank_credentials_are_fatal() {
        let (_dir, store) = store();
        assert!(matches!(
            seed(&store, "  ", &password()),
            Err(AuthError::Config(_))
        ));
        assert!(matches!(
            seed(&store, "admin@ripperdoc.shop", &SecretValue::from("")),
            Err(AuthError::Config(_))
        ));
        assert!(matches!(
            seed(&store, "not-an-email", &password()),
            Err(AuthError::Config(_))
        ));
        // Nothing was written before the check.
        assert!(store.find_role_by_name(&RoleName::admin()).unwrap().is_none());
    }
}
