//! Serve command - seed, then run the HTTP gateway.

use std::path::PathBuf;

use anyhow::Result;
use ripperdoc_core::config::BindMode;
use ripperdoc_gateway::GatewayConfig;

use crate::ui;

/// Serve command arguments.
#[derive(Debug, Clone, Default)]
pub struct ServeArgs {
    /// Port override.
    pub port: Option<u16>,
    /// Bind address override.
    pub bind: Option<String>,
    /// Config file path.
    pub config: Option<PathBuf>,
}

/// Run the serve command.
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config = super::load_config(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.gateway.port = port;
    }
    if let Some(bind) = args.bind {
        config.gateway.mode = BindMode::Custom(bind);
    }

    let gateway_config = match GatewayConfig::from_config(&config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            ui::error(&e.to_string());
            ui::info("Run 'ripperdoc config check' to see what is missing");
            return Err(e.into());
        }
    };

    ui::header("Starting Ripperdoc Gateway");
    ui::kv("Address", &gateway_config.listen_address());
    ui::kv("Environment", &config.environment.to_string());
    ui::kv("Data", &gateway_config.data_dir.display().to_string());
    println!();

    ripperdoc_gateway::start(gateway_config).await?;

    ui::success("Gateway stopped");
    Ok(())
}
