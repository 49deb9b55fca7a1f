//! Authentication configuration.

use std::num::NonZeroU32;
use std::time::Duration;

use ripperdoc_core::{Config, SecretValue};

use super::AuthError;

/// Default token lifetime in minutes.
const DEFAULT_TOKEN_LIFETIME_MINUTES: u64 = 120;
/// Default cookie carrying the access token.
const DEFAULT_COOKIE_NAME: &str = "AccessToken";
/// Default login attempts per minute per email.
const DEFAULT_LOGIN_RATE_LIMIT: u32 = 10;

/// Resolved authentication settings used at runtime.
///
/// Unlike [`ripperdoc_core::config::AuthSettings`], every required value is
/// present here; construction fails otherwise.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Expected `iss` claim.
    pub issuer: String,
    /// Expected `aud` claim.
    pub audience: String,
    /// HMAC signing secret.
    pub secret: SecretValue,
    /// Access token lifetime.
    pub token_lifetime: Duration,
    /// Cookie name for cookie transport.
    pub cookie_name: String,
    /// Trust token role claims instead of re-reading the store per request.
    pub trust_token_claims: bool,
    /// Mark the access cookie `Secure; SameSite=None`.
    pub secure_cookies: bool,
    /// Login attempts per minute per email.
    pub login_rate_limit: NonZeroU32,
}

impl AuthConfig {
    /// Create a new auth config builder.
    #[must_use]
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }

    /// Derive runtime settings from the loaded configuration.
    ///
    /// Cookies are marked secure everywhere except in development.
    ///
    /// # Errors
    ///
    /// Returns error if issuer, audience or secret is missing.
    pub fn from_config(config: &Config) -> Result<Self, AuthError> {
        let auth = &config.auth;
        let mut builder = Self::builder()
            .token_lifetime(Duration::from_secs(auth.token_lifetime_minutes * 60))
            .cookie_name(auth.cookie_name.clone())
            .trust_token_claims(auth.trust_token_claims)
            .secure_cookies(!config.environment.is_development())
            .login_rate_limit(config.login_rate_limit);

        if let Some(issuer) = &auth.issuer {
            builder = builder.issuer(issuer.clone());
        }
        if let Some(audience) = &auth.audience {
            builder = builder.audience(audience.clone());
        }
        if let Some(secret) = &auth.jwt_secret {
            builder = builder.secret(secret.clone());
        }
        builder.build()
    }

    /// Token lifetime in whole seconds, for cookie `Max-Age`.
    #[must_use]
    pub const fn max_age_secs(&self) -> u64 {
        self.token_lifetime.as_secs()
    }
}

/// Builder for `AuthConfig`.
#[derive(Debug)]
pub struct AuthConfigBuilder {
    issuer: Option<String>,
    audience: Option<String>,
    secret: Option<SecretValue>,
    token_lifetime: Duration,
    cookie_name: String,
    trust_token_claims: bool,
    secure_cookies: bool,
    login_rate_limit: u32,
}

impl Default for AuthConfigBuilder {
    fn default() -> Self {
        Self {
            issuer: None,
            audience: None,
            secret: None,
            token_lifetime: Duration::from_secs(DEFAULT_TOKEN_LIFETIME_MINUTES * 60),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            trust_token_claims: true,
            secure_cookies: true,
            login_rate_limit: DEFAULT_LOGIN_RATE_LIMIT,
        }
    }
}

impl AuthConfigBuilder {
    /// Set the expected issuer.
    #[must_use]
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Set the expected audience.
    #[must_use]
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Set the signing secret.
    #[must_use]
    pub fn secret(mut self, secret: impl Into<SecretValue>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Set the token lifetime.
    #[must_use]
    pub const fn token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    /// Set the cookie name.
    #[must_use]
    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Choose between trusting token claims and live store lookups.
    #[must_use]
    pub const fn trust_token_claims(mut self, trust: bool) -> Self {
        self.trust_token_claims = trust;
        self
    }

    /// Set whether cookies carry `Secure; SameSite=None`.
    #[must_use]
    pub const fn secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    /// Set login attempts allowed per minute per email.
    #[must_use]
    pub const fn login_rate_limit(mut self, per_minute: u32) -> Self {
        self.login_rate_limit = per_minute;
        self
    }

    /// Build the config.
    ///
    /// # Errors
    ///
    /// Returns error if issuer, audience or secret is unset or blank, or the
    /// rate limit is zero.
    pub fn build(self) -> Result<AuthConfig, AuthError> {
        let issuer = required("issuer", self.issuer)?;
        let audience = required("audience", self.audience)?;
        let secret = self
            .secret
            .filter(|s| !s.is_blank())
            .ok_or_else(|| AuthError::Config("JWT secret is required".to_string()))?;
        let login_rate_limit = NonZeroU32::new(self.login_rate_limit)
            .ok_or_else(|| AuthError::Config("Login rate limit must be positive".to_string()))?;

        Ok(AuthConfig {
            issuer,
            audience,
            secret,
            token_lifetime: self.token_lifetime,
            cookie_name: self.cookie_name,
            trust_token_claims: self.trust_token_claims,
            secure_cookies: self.secure_cookies,
            login_rate_limit,
        })
    }
}

fn required(field: &str, value: Option<String>) -> Result<String, AuthError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AuthError::Config(format!("JWT {field} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripperdoc_core::Environment;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_builder_defaults() {
        let config = AuthConfig::builder()
            .issuer("ripperdoc")
            .audience("shop")
            .secret(SECRET)
            .build()
            .unwrap();

        assert_eq!(config.token_lifetime, Duration::from_secs(120 * 60));
        assert_eq!(config.cookie_name, "AccessToken");
        assert!(config.trust_token_claims);
        assert!(config.secure_cookies);
        assert_eq!(config.login_rate_limit.get(), 10);
        assert_eq!(config.max_age_secs(), 7200);
    }

    #[test]
    fn test_builder_requires_fields() {
        assert!(AuthConfig::builder().audience("a").secret(SECRET).build().is_err());
        assert!(AuthConfig::builder().issuer("i").secret(SECRET).build().is_err());
        assert!(AuthConfig::builder().issuer("i").audience("a").build().is_err());
        assert!(
            AuthConfig::builder()
                .issuer("i")
                .audience("a")
                .secret("   ")
                .build()
                .is_err()
        );
        assert!(
            AuthConfig::builder()
                .issuer("i")
                .audience("a")
                .secret(SECRET)
                .login_rate_limit(0)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.environment = Environment::Development;
        config.auth.issuer = Some("ripperdoc".to_string());
        config.auth.audience = Some("shop".to_string());
        config.auth.jwt_secret = Some(SECRET.into());
        config.auth.token_lifetime_minutes = 60;
        config.auth.trust_token_claims = false;

        let auth = AuthConfig::from_config(&config).unwrap();
        assert_eq!(auth.issuer, "ripperdoc");
        assert_eq!(auth.token_lifetime, Duration::from_secs(3600));
        assert!(!auth.trust_token_claims);
        assert!(!auth.secure_cookies);
        assert_eq!(auth.secret.expose(), SECRET);
    }

    #[test]
    fn test_from_config_missing_secret() {
        let mut config = Config::default();
        config.auth.issuer = Some("ripperdoc".to_string());
        config.auth.audience = Some("shop".to_string());
        assert!(matches!(
            AuthConfig::from_config(&config),
            Err(AuthError::Config(_))
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = AuthConfig::builder()
            .issuer("i")
            .audience("a")
            .secret(SECRET)
            .build()
            .unwrap();
        assert!(!format!("{config:?}").contains(SECRET));
    }
}
