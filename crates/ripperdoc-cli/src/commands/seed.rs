//! Seed command - ensure required roles and the administrator, then exit.

use std::path::PathBuf;

use anyhow::Result;
use ripperdoc_gateway::{Gateway, GatewayConfig};

use crate::ui;

/// Seed command arguments.
#[derive(Debug, Clone, Default)]
pub struct SeedArgs {
    /// Config file path.
    pub config: Option<PathBuf>,
    /// Print the report as JSON.
    pub json: bool,
}

/// Run the seed command.
pub async fn run_seed(args: SeedArgs) -> Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let gateway = Gateway::new(GatewayConfig::from_config(&config)?)?;
    let report = tokio::task::spawn_blocking(move || gateway.seed()).await??;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.roles_created.is_empty() {
        ui::info("All required roles already present");
    }
    for role in &report.roles_created {
        ui::success(&format!("Created role '{role}'"));
    }
    if report.admin_created {
        ui::success(&format!("Created administrator {}", report.admin_id));
    } else {
        ui::info(&format!("Administrator {} already present", report.admin_id));
    }

    Ok(())
}
