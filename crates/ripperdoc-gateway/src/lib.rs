//! # Ripperdoc Gateway
//!
//! Authentication core and HTTP gateway for the Ripperdoc shop backend.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and authorization.
pub mod auth;
mod middleware;
mod server;

pub use auth::{AuthConfig, AuthError, AuthState, CredentialStore, SledCredentialStore, TokenRejection};
pub use middleware::LoginRateLimiter;
pub use server::{Gateway, GatewayConfig, GatewayState};

/// Start the gateway server: seed, then serve until Ctrl+C.
///
/// # Errors
///
/// Returns error if the store cannot be opened, seeding fails, or the
/// server fails to start.
pub async fn start(config: GatewayConfig) -> Result<(), GatewayError> {
    let gateway = Gateway::new(config)?;
    gateway.run().await
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Server error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Auth subsystem could not be initialised.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Bootstrap seeding failed; the server must not start.
    #[error("Bootstrap failed: {0}")]
    Bootstrap(#[source] AuthError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
