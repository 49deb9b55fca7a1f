//! Operator account commands acting directly on the credential store.
//!
//! The store is a single-process database, so these commands fail to open
//! it while a gateway is running against the same data directory.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use ripperdoc_core::RoleName;
use ripperdoc_gateway::CredentialStore;
use ripperdoc_gateway::SledCredentialStore;
use ripperdoc_gateway::auth::{PublicUser, User};

use crate::ui;

/// Arguments for user commands.
pub struct UsersArgs {
    /// The action to perform.
    pub action: UsersAction,
    /// Config file path.
    pub config: Option<PathBuf>,
}

/// User actions.
pub enum UsersAction {
    /// List all accounts.
    List { json: bool },
    /// Disable an account.
    Disable { email: String },
    /// Re-enable an account.
    Enable { email: String },
    /// Grant a role.
    Grant { email: String, role: String },
}

/// Run the users command.
///
/// # Errors
///
/// Returns error if the store cannot be opened or the operation fails.
pub async fn run_users(args: UsersArgs) -> Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let store = SledCredentialStore::open(&data_dir)
        .with_context(|| format!("Failed to open credential store in {}", data_dir.display()))?;

    match args.action {
        UsersAction::List { json } => {
            let users = list_users(&store)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&users)?);
            } else {
                print_users(&users);
            }
        }
        UsersAction::Disable { email } => {
            set_disabled(&store, &email, true)?;
            ui::success(&format!("User '{email}' disabled"));
        }
        UsersAction::Enable { email } => {
            set_disabled(&store, &email, false)?;
            ui::success(&format!("User '{email}' enabled"));
        }
        UsersAction::Grant { email, role } => {
            if grant_role(&store, &email, &role)? {
                ui::success(&format!("Granted '{role}' to '{email}'"));
            } else {
                ui::info(&format!("'{email}' already has '{role}'"));
            }
        }
    }

    Ok(())
}

fn require_user(store: &dyn CredentialStore, email: &str) -> Result<User> {
    store
        .find_user_by_email(email)?
        .ok_or_else(|| anyhow!("User not found: {email}"))
}

fn list_users(store: &dyn CredentialStore) -> Result<Vec<PublicUser>> {
    let mut users = store
        .list_users()?
        .into_iter()
        .map(|user| -> Result<PublicUser> {
            let roles = store.list_roles(user.id)?;
            Ok(user.to_public(roles))
        })
        .collect::<Result<Vec<_>>>()?;
    users.sort_by(|a, b| a.email.cmp(&b.email));
    Ok(users)
}

fn set_disabled(store: &dyn CredentialStore, email: &str, disabled: bool) -> Result<User> {
    let user = require_user(store, email)?;
    Ok(store.set_disabled(user.id, disabled)?)
}

fn grant_role(store: &dyn CredentialStore, email: &str, role: &str) -> Result<bool> {
    let user = require_user(store, email)?;
    Ok(store.assign_role(user.id, &RoleName::new(role))?)
}

fn print_users(users: &[PublicUser]) {
    if users.is_empty() {
        ui::info("No users yet. Run 'ripperdoc seed' to create the administrator.");
        return;
    }

    ui::info(&format!("Users ({}):", users.len()));
    println!();
    println!(
        "{:<32} {:<20} {:<9} {:<20}",
        "EMAIL", "ROLES", "DISABLED", "LAST LOGIN"
    );
    println!("{}", "-".repeat(83));

    for user in users {
        let roles = user
            .roles
            .iter()
            .map(RoleName::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let disabled = if user.disabled { "yes" } else { "no" };
        let last_login = user.last_login.map_or_else(
            || "never".to_string(),
            |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        println!(
            "{:<32} {:<20} {:<9} {:<20}",
            user.email, roles, disabled, last_login
        );
    }
}
