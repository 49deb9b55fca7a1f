//! # Ripperdoc Core
//!
//! Core types, configuration, and secrets for the Ripperdoc shop backend.
//!
//! This crate provides:
//! - Configuration loading and validation (JSON5 format, env overrides)
//! - Identity types (user and role identifiers, role names)
//! - Secret wrappers that never print their contents
//! - Input validation and normalization

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod secrets;
pub mod types;
pub mod validation;

pub use config::{Config, ConfigError, Environment};
pub use secrets::{SecretValue, scrub_secrets};
pub use types::{RoleId, RoleName, RoleSet, UserId, role_set};
pub use validation::{ValidationError, canonical_email, normalize_email, validate_password};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::secrets::SecretValue;
    pub use crate::types::*;
}
