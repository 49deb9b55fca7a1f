//! Ripperdoc CLI - serve the shop backend and manage its accounts.

mod commands;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "ripperdoc")]
#[command(about = "Ripperdoc - shop backend gateway and account tools")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed roles and the administrator, then serve HTTP until Ctrl+C
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address (overrides gateway.mode)
        #[arg(short, long)]
        bind: Option<String>,

        /// Config file (default: ~/.ripperdoc/ripperdoc.json)
        #[arg(short, long, env = "RIPPERDOC_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Seed roles and the administrator, then exit
    Seed {
        /// Config file
        #[arg(short, long, env = "RIPPERDOC_CONFIG")]
        config: Option<PathBuf>,

        /// Print the seed report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage accounts directly in the credential store
    Users {
        /// Config file
        #[arg(short, long, global = true, env = "RIPPERDOC_CONFIG")]
        config: Option<PathBuf>,

        #[command(subcommand)]
        action: UsersCommands,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum UsersCommands {
    /// List all accounts with their roles
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Disable an account
    Disable {
        /// Account email
        #[arg(long)]
        email: String,
    },

    /// Re-enable an account
    Enable {
        /// Account email
        #[arg(long)]
        email: String,
    },

    /// Grant a role to an account
    Grant {
        /// Account email
        #[arg(long)]
        email: String,

        /// Role name, e.g. Admin or Customer
        #[arg(long)]
        role: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Validate configuration and print a redacted summary
    Check {
        /// Config file
        #[arg(short, long, env = "RIPPERDOC_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    let json_layer = cli.log_json.then(|| fmt::layer().json().with_current_span(false));
    let text_layer = (!cli.log_json).then(|| fmt::layer().with_target(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();

    match cli.command {
        Commands::Serve { port, bind, config } => {
            let args = commands::serve::ServeArgs { port, bind, config };
            commands::run_serve(args).await?;
        }

        Commands::Seed { config, json } => {
            let args = commands::seed::SeedArgs { config, json };
            commands::run_seed(args).await?;
        }

        Commands::Users { config, action } => {
            let action = match action {
                UsersCommands::List { json } => commands::users::UsersAction::List { json },
                UsersCommands::Disable { email } => commands::users::UsersAction::Disable { email },
                UsersCommands::Enable { email } => commands::users::UsersAction::Enable { email },
                UsersCommands::Grant { email, role } => {
                    commands::users::UsersAction::Grant { email, role }
                }
            };
            commands::run_users(commands::users::UsersArgs { action, config }).await?;
        }

        Commands::Config { action } => match action {
            ConfigCommands::Check { config } => {
                commands::run_config_check(commands::config::ConfigArgs { config }).await?;
            }
        },
    }

    Ok(())
}
