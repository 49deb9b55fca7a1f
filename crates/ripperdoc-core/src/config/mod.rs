//! Configuration loading and validation.
//!
//! Config is JSON5, read from `~/.ripperdoc/ripperdoc.json` unless a path is
//! given, then overlaid with environment variables. Values needed to serve
//! traffic (signing secret, issuer, audience, bootstrap admin) have no
//! defaults: a missing value is a startup error.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::secrets::SecretValue;

/// Minimum HMAC-SHA256 signing key size in bytes.
pub const MIN_JWT_SECRET_BYTES: usize = 32;

/// Upper bound for the access-token lifetime (one day).
pub const MAX_TOKEN_LIFETIME_MINUTES: u64 = 24 * 60;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing required field.
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Deployment environment.
    #[serde(default)]
    pub environment: Environment,

    /// HTTP server configuration.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Token issuance and validation settings.
    #[serde(default)]
    pub auth: AuthSettings,

    /// Bootstrap administrator credentials.
    #[serde(default)]
    pub admin: AdminSettings,

    /// Login attempts allowed per minute for a single email.
    #[serde(default = "default_login_rate_limit")]
    pub login_rate_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            gateway: GatewayConfig::default(),
            auth: AuthSettings::default(),
            admin: AdminSettings::default(),
            login_rate_limit: default_login_rate_limit(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, or defaults if absent.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        tracing::debug!(path = %path.display(), "Loading config");
        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;
        Ok(config)
    }

    /// Load from `path` (or the default location), apply environment
    /// overrides and validate everything startup needs.
    ///
    /// # Errors
    ///
    /// Returns error if loading fails or a required value is missing.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => Self::load(p)?,
            None => Self::load_default()?,
        };
        let config = config.with_env_overrides()?;
        config.validate_for_startup()?;
        Ok(config)
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("ripperdoc.json")
    }

    /// Get the state directory.
    ///
    /// Uses `RIPPERDOC_STATE_DIR` env var if set, otherwise `~/.ripperdoc`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("RIPPERDOC_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".ripperdoc")
        } else {
            PathBuf::from(".ripperdoc")
        }
    }

    /// Directory holding the credential database.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.gateway
            .data_dir
            .clone()
            .unwrap_or_else(|| Self::state_dir().join("data"))
    }

    /// Apply overrides from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if a numeric or boolean override cannot be parsed.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns error if a numeric or boolean override cannot be parsed.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env) = lookup("RIPPERDOC_ENVIRONMENT") {
            self.environment = env.parse()?;
        }
        if let Some(port) = lookup("RIPPERDOC_PORT") {
            self.gateway.port = port
                .parse()
                .map_err(|e| ConfigError::Validation(format!("RIPPERDOC_PORT: {e}")))?;
        }
        if let Some(issuer) = lookup("RIPPERDOC_JWT_ISSUER") {
            self.auth.issuer = Some(issuer);
        }
        if let Some(audience) = lookup("RIPPERDOC_JWT_AUDIENCE") {
            self.auth.audience = Some(audience);
        }
        if let Some(secret) = lookup("RIPPERDOC_JWT_SECRET") {
            self.auth.jwt_secret = Some(SecretValue::new(secret));
        }
        if let Some(minutes) = lookup("RIPPERDOC_TOKEN_LIFETIME_MINUTES") {
            self.auth.token_lifetime_minutes = minutes.parse().map_err(|e| {
                ConfigError::Validation(format!("RIPPERDOC_TOKEN_LIFETIME_MINUTES: {e}"))
            })?;
        }
        if let Some(trust) = lookup("RIPPERDOC_TRUST_TOKEN_CLAIMS") {
            self.auth.trust_token_claims = parse_bool(&trust).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "RIPPERDOC_TRUST_TOKEN_CLAIMS: expected true/false, got '{trust}'"
                ))
            })?;
        }

        // Config file wins over the bare ADMIN_* variables, matching how
        // operators rotate the bootstrap account in the file.
        if self.admin.email.is_none() {
            self.admin.email = lookup("ADMIN_EMAIL");
        }
        if self.admin.password.is_none() {
            self.admin.password = lookup("ADMIN_PASSWORD").map(SecretValue::new);
        }

        Ok(self)
    }

    /// Validate every value the server needs before it may accept traffic.
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid value.
    pub fn validate_for_startup(&self) -> Result<(), ConfigError> {
        if self.gateway.port == 0 {
            return Err(ConfigError::Validation(
                "Gateway port cannot be 0".to_string(),
            ));
        }

        match &self.auth.jwt_secret {
            None => return Err(ConfigError::MissingField("auth.jwtSecret".to_string())),
            Some(secret) if secret.is_blank() => {
                return Err(ConfigError::MissingField("auth.jwtSecret".to_string()));
            }
            Some(secret) if secret.len() < MIN_JWT_SECRET_BYTES => {
                return Err(ConfigError::Validation(format!(
                    "auth.jwtSecret must be at least {MIN_JWT_SECRET_BYTES} bytes"
                )));
            }
            Some(_) => {}
        }

        require_text(self.auth.issuer.as_deref(), "auth.issuer")?;
        require_text(self.auth.audience.as_deref(), "auth.audience")?;

        if self.auth.token_lifetime_minutes == 0
            || self.auth.token_lifetime_minutes > MAX_TOKEN_LIFETIME_MINUTES
        {
            return Err(ConfigError::Validation(format!(
                "auth.tokenLifetimeMinutes must be between 1 and {MAX_TOKEN_LIFETIME_MINUTES}"
            )));
        }

        if self.auth.cookie_name.is_empty()
            || !self
                .auth
                .cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::Validation(
                "auth.cookieName must be a non-empty token".to_string(),
            ));
        }

        require_text(self.admin.email.as_deref(), "admin.email (or ADMIN_EMAIL)")?;
        match &self.admin.password {
            Some(p) if !p.is_blank() => {}
            _ => {
                return Err(ConfigError::MissingField(
                    "admin.password (or ADMIN_PASSWORD)".to_string(),
                ));
            }
        }

        if self.login_rate_limit == 0 {
            return Err(ConfigError::Validation(
                "loginRateLimit cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn require_text(value: Option<&str>, field: &str) -> Result<(), ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(ConfigError::MissingField(field.to_string())),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

const fn default_login_rate_limit() -> u32 {
    10
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development: relaxed cookie flags.
    Development,
    /// Anything deployed.
    #[default]
    Production,
}

impl Environment {
    /// Whether this is the development environment.
    #[must_use]
    pub const fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl std::str::FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::Validation(format!(
                "Unknown environment: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address mode.
    #[serde(default)]
    pub mode: BindMode,

    /// Credential database directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            mode: BindMode::default(),
            data_dir: None,
        }
    }
}

const fn default_port() -> u16 {
    5080
}

/// Gateway bind mode.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    /// Bind to localhost only.
    #[default]
    Local,
    /// Bind to all interfaces.
    Public,
    /// Custom bind address.
    Custom(String),
}

impl BindMode {
    /// Address to bind for this mode.
    #[must_use]
    pub fn address(&self) -> String {
        match self {
            Self::Local => "127.0.0.1".to_string(),
            Self::Public => "0.0.0.0".to_string(),
            Self::Custom(addr) => addr.clone(),
        }
    }
}

/// Token issuance and validation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSettings {
    /// Expected `iss` claim.
    #[serde(default)]
    pub issuer: Option<String>,

    /// Expected `aud` claim.
    #[serde(default)]
    pub audience: Option<String>,

    /// HMAC signing secret (raw UTF-8 bytes are the key).
    #[serde(default)]
    pub jwt_secret: Option<SecretValue>,

    /// Access-token lifetime in minutes.
    #[serde(default = "default_token_lifetime")]
    pub token_lifetime_minutes: u64,

    /// Cookie carrying the token when no `Authorization` header is sent.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Trust role claims in the token instead of re-reading the store.
    #[serde(default = "default_true")]
    pub trust_token_claims: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            issuer: None,
            audience: None,
            jwt_secret: None,
            token_lifetime_minutes: default_token_lifetime(),
            cookie_name: default_cookie_name(),
            trust_token_claims: true,
        }
    }
}

const fn default_token_lifetime() -> u64 {
    120
}

fn default_cookie_name() -> String {
    "AccessToken".to_string()
}

const fn default_true() -> bool {
    true
}

/// Bootstrap administrator credentials.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSettings {
    /// Administrator email.
    #[serde(default)]
    pub email: Option<String>,

    /// Administrator password (plaintext, hashed at seed time).
    #[serde(default)]
    pub password: Option<SecretValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tempfile::tempdir;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn complete() -> Config {
        let mut config = Config::default();
        config.auth.issuer = Some("ripperdoc-api".to_string());
        config.auth.audience = Some("ripperdoc-admin".to_string());
        config.auth.jwt_secret = Some(SecretValue::from(SECRET));
        config.admin.email = Some("admin@ripperdoc.shop".to_string());
        config.admin.password = Some(SecretValue::from("Passw0rd!"));
        config
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gateway.port, 5080);
        assert_eq!(config.auth.cookie_name, "AccessToken");
        assert_eq!(config.auth.token_lifetime_minutes, 120);
        assert!(config.auth.trust_token_claims);
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.login_rate_limit, 10);
    }

    #[test]
    fn test_env_only_config_is_valid() {
        let vars: HashMap<&str, &str> = [
            ("RIPPERDOC_JWT_ISSUER", "ripperdoc-api"),
            ("RIPPERDOC_JWT_AUDIENCE", "ripperdoc-admin"),
            ("RIPPERDOC_JWT_SECRET", SECRET),
            ("ADMIN_EMAIL", "admin@ripperdoc.shop"),
            ("ADMIN_PASSWORD", "bootstrap-pass"),
        ]
        .into_iter()
        .collect();

        let config = Config::default()
            .with_overrides_from(|key| vars.get(key).map(ToString::to_string))
            .unwrap();
        assert_eq!(config.login_rate_limit, 10);
        assert!(config.validate_for_startup().is_ok());
    }

    #[test]
    fn test_complete_config_is_valid() {
        assert!(complete().validate_for_startup().is_ok());
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        let mut config = complete();
        config.auth.jwt_secret = None;
        assert!(matches!(
            config.validate_for_startup(),
            Err(ConfigError::MissingField(f)) if f == "auth.jwtSecret"
        ));
    }

    #[test]
    fn test_short_secret_is_rejected() {
        let mut config = complete();
        config.auth.jwt_secret = Some(SecretValue::from("too-short"));
        assert!(matches!(
            config.validate_for_startup(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_blank_admin_credentials_are_fatal() {
        let mut config = complete();
        config.admin.email = Some("   ".to_string());
        assert!(matches!(
            config.validate_for_startup(),
            Err(ConfigError::MissingField(_))
        ));

        let mut config = complete();
        config.admin.password = Some(SecretValue::from(""));
        assert!(matches!(
            config.validate_for_startup(),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn test_lifetime_bounds() {
        let mut config = complete();
        config.auth.token_lifetime_minutes = 0;
        assert!(config.validate_for_startup().is_err());
        config.auth.token_lifetime_minutes = MAX_TOKEN_LIFETIME_MINUTES + 1;
        assert!(config.validate_for_startup().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default()
            .with_overrides_from(env(&[
                ("RIPPERDOC_ENVIRONMENT", "development"),
                ("RIPPERDOC_PORT", "9000"),
                ("RIPPERDOC_JWT_ISSUER", "iss"),
                ("RIPPERDOC_JWT_AUDIENCE", "aud"),
                ("RIPPERDOC_JWT_SECRET", SECRET),
                ("RIPPERDOC_TOKEN_LIFETIME_MINUTES", "60"),
                ("RIPPERDOC_TRUST_TOKEN_CLAIMS", "false"),
                ("ADMIN_EMAIL", "ops@ripperdoc.shop"),
                ("ADMIN_PASSWORD", "hunter22"),
            ]))
            .unwrap();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.auth.issuer.as_deref(), Some("iss"));
        assert_eq!(config.auth.token_lifetime_minutes, 60);
        assert!(!config.auth.trust_token_claims);
        assert_eq!(config.admin.email.as_deref(), Some("ops@ripperdoc.shop"));
        assert!(config.validate_for_startup().is_ok());
    }

    #[test]
    fn test_file_admin_wins_over_env_admin() {
        let config = complete()
            .with_overrides_from(env(&[("ADMIN_EMAIL", "other@ripperdoc.shop")]))
            .unwrap();
        assert_eq!(config.admin.email.as_deref(), Some("admin@ripperdoc.shop"));
    }

    #[test]
    fn test_bad_numeric_override() {
        let result = Config::default().with_overrides_from(env(&[("RIPPERDOC_PORT", "http")]));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_json5_parsing() {
        let json5_content = r#"{
            // deployment
            environment: "development",
            gateway: { port: 8080, mode: "public" },
            auth: {
                issuer: "ripperdoc-api",
                audience: "ripperdoc-admin",
                jwtSecret: "0123456789abcdef0123456789abcdef",
                tokenLifetimeMinutes: 90,
                trustTokenClaims: false,
            },
            admin: { email: "admin@ripperdoc.shop", password: "Passw0rd!" },
        }"#;

        let config: Config = json5::from_str(json5_content).unwrap();
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.mode.address(), "0.0.0.0");
        assert_eq!(config.auth.token_lifetime_minutes, 90);
        assert!(!config.auth.trust_token_claims);
        assert!(config.environment.is_development());
        assert!(config.validate_for_startup().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("ripperdoc.json");
        std::fs::write(&path, r#"{ gateway: { port: 7000 } }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.gateway.port, 7000);
    }

    #[test]
    fn test_debug_does_not_leak_secrets() {
        let rendered = format!("{:?}", complete());
        assert!(!rendered.contains(SECRET));
        assert!(!rendered.contains("Passw0rd!"));
    }
}
