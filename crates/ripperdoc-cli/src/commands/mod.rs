//! CLI command implementations.

pub mod config;
pub mod seed;
pub mod serve;
pub mod users;

pub use config::run_config_check;
pub use seed::run_seed;
pub use serve::run_serve;
pub use users::run_users;

use std::path::Path;

use anyhow::Context;
use ripperdoc_core::Config;

/// Load config from `path` (or the default location) with environment
/// overrides, without requiring the values only serving needs.
pub(crate) fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(p) => Config::load(p).with_context(|| format!("Failed to load {}", p.display()))?,
        None => Config::load_default().context("Failed to load default config")?,
    };
    Ok(config.with_env_overrides()?)
}
