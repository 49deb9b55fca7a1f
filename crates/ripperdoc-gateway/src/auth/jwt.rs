//! Access token issuance and validation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use ripperdoc_core::config::MIN_JWT_SECRET_BYTES;
use ripperdoc_core::{RoleSet, UserId};
use serde::{Deserialize, Serialize};

use super::config::AuthConfig;
use super::users::User;
use super::{AuthError, TokenRejection};

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: UserId,
    /// Email at issuance time.
    pub email: String,
    /// Role names held at issuance time.
    #[serde(default)]
    pub roles: RoleSet,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Issuer.
    pub iss: String,
    /// Audience.
    pub aud: String,
    /// Unique token ID.
    pub jti: String,
}

impl Claims {
    /// Absolute expiry instant.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// A signed token and the instant it stops being accepted.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    /// Compact JWS.
    pub token: String,
    /// Expiration.
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Signing material and the fixed token parameters.
///
/// Built once at startup and shared read-only by the issuer and validator.
pub struct JwtKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    lifetime: Duration,
}

impl JwtKeys {
    /// Build keys from a raw secret.
    ///
    /// # Errors
    ///
    /// Returns error if the secret is shorter than 32 bytes, the issuer or
    /// audience is blank, or the lifetime is not positive.
    pub fn new(
        secret: &[u8],
        issuer: impl Into<String>,
        audience: impl Into<String>,
        lifetime: std::time::Duration,
    ) -> Result<Self, AuthError> {
        if secret.len() < MIN_JWT_SECRET_BYTES {
            return Err(AuthError::Config(format!(
                "JWT secret must be at least {MIN_JWT_SECRET_BYTES} bytes"
            )));
        }
        let issuer = issuer.into();
        let audience = audience.into();
        if issuer.trim().is_empty() || audience.trim().is_empty() {
            return Err(AuthError::Config(
                "JWT issuer and audience must be set".to_string(),
            ));
        }
        let lifetime = Duration::from_std(lifetime)
            .ok()
            .filter(|d| *d > Duration::zero())
            .ok_or_else(|| AuthError::Config("Token lifetime must be positive".to_string()))?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_audience(&[audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        // Expiry is checked by hand after issuer and audience, with no leeway.
        validation.validate_exp = false;
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            issuer,
            audience,
            lifetime,
        })
    }

    /// Build keys from auth configuration.
    ///
    /// # Errors
    ///
    /// See [`JwtKeys::new`].
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        Self::new(
            config.secret.expose().as_bytes(),
            config.issuer.clone(),
            config.audience.clone(),
            config.token_lifetime,
        )
    }

    /// Configured token lifetime.
    #[must_use]
    pub const fn lifetime(&self) -> Duration {
        self.lifetime
    }
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeys")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

/// Creates signed access tokens.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    keys: Arc<JwtKeys>,
}

impl TokenIssuer {
    /// Create an issuer over shared keys.
    #[must_use]
    pub const fn new(keys: Arc<JwtKeys>) -> Self {
        Self { keys }
    }

    /// Issue a token for an authenticated user.
    ///
    /// `roles` is copied into the token; later membership changes do not
    /// affect it.
    ///
    /// # Errors
    ///
    /// Returns error if token encoding fails.
    pub fn issue(&self, user: &User, roles: RoleSet) -> Result<IssuedToken, AuthError> {
        self.issue_at(user, roles, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// Returns error if token encoding fails.
    pub fn issue_at(
        &self,
        user: &User,
        roles: RoleSet,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        let iat = now.timestamp();
        let exp = iat + self.keys.lifetime.num_seconds();

        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            roles,
            iat,
            exp,
            iss: self.keys.issuer.clone(),
            aud: self.keys.audience.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.keys.encoding_key)
            .map_err(|e| AuthError::TokenIssue(format!("Encoding failed: {e}")))?;

        Ok(IssuedToken {
            token,
            expires_at: claims.expires_at(),
        })
    }
}

/// Verifies access tokens.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    keys: Arc<JwtKeys>,
}

impl TokenValidator {
    /// Create a validator over shared keys.
    #[must_use]
    pub const fn new(keys: Arc<JwtKeys>) -> Self {
        Self { keys }
    }

    /// Validate a raw token against the current time.
    ///
    /// # Errors
    ///
    /// Returns the first check that failed.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenRejection> {
        self.validate_at(token, Utc::now())
    }

    /// Validate a raw token as if the current time were `now`.
    ///
    /// Checks run in order: structure, signature, issuer and audience, then
    /// expiry. A token is expired from its `exp` instant onwards.
    ///
    /// # Errors
    ///
    /// Returns the first check that failed.
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenRejection> {
        let data = decode::<Claims>(token, &self.keys.decoding_key, &self.keys.validation)
            .map_err(|e| classify(e.kind()))?;

        if now < data.claims.expires_at() {
            Ok(data.claims)
        } else {
            Err(TokenRejection::Expired)
        }
    }
}

fn classify(kind: &ErrorKind) -> TokenRejection {
    match kind {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::InvalidKeyFormat => TokenRejection::BadSignature,
        ErrorKind::InvalidIssuer | ErrorKind::InvalidAudience => {
            TokenRejection::WrongIssuerOrAudience
        }
        ErrorKind::ExpiredSignature => TokenRejection::Expired,
        _ => TokenRejection::Malformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripperdoc_core::role_set;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";
    const HOUR: std::time::Duration = std::time::Duration::from_secs(3600);

    fn keys(secret: &[u8], issuer: &str, audience: &str) -> Arc<JwtKeys> {
        Arc::new(JwtKeys::new(secret, issuer, audience, HOUR).unwrap())
    }

    fn pair() -> (TokenIssuer, TokenValidator) {
        let keys = keys(SECRET, "ripperdoc", "shop");
        (TokenIssuer::new(keys.clone()), TokenValidator::new(keys))
    }

    fn user() -> User {
        User::new("shopper@example.com", "unused-hash")
    }

    fn at(ts: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(ts, 0).unwrap()
    }

    #[test]
    fn test_issue_and_validate() {
        let (issuer, validator) = pair();
        let user = user();
        let issued = issuer.issue(&user, role_set(["Customer"])).unwrap();

        let claims = validator.validate(&issued.token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, "shopper@example.com");
        assert_eq!(claims.roles, role_set(["Customer"]));
        assert_eq!(claims.iss, "ripperdoc");
        assert_eq!(claims.aud, "shop");
        assert_eq!(claims.expires_at(), issued.expires_at);
    }

    #[test]
    fn test_expiry_is_lifetime_after_issue() {
        let (issuer, _) = pair();
        let issued = issuer.issue_at(&user(), RoleSet::new(), at(1_700_000_000)).unwrap();
        assert_eq!(issued.expires_at, at(1_700_000_000 + 3600));
    }

    #[test]
    fn test_expired_exactly_at_boundary() {
        let (issuer, validator) = pair();
        let issued = issuer.issue_at(&user(), RoleSet::new(), at(1_700_000_000)).unwrap();

        assert!(validator.validate_at(&issued.token, at(1_700_003_599)).is_ok());
        assert_eq!(
            validator.validate_at(&issued.token, at(1_700_003_600)),
            Err(TokenRejection::Expired)
        );
        assert_eq!(
            validator.validate_at(&issued.token, at(1_700_003_601)),
            Err(TokenRejection::Expired)
        );
    }

    #[test]
    fn test_wrong_key_is_bad_signature() {
        let (issuer, _) = pair();
        let other = TokenValidator::new(keys(b"ffffffffffffffffffffffffffffffff", "ripperdoc", "shop"));
        let issued = issuer.issue(&user(), RoleSet::new()).unwrap();
        assert_eq!(other.validate(&issued.token), Err(TokenRejection::BadSignature));
    }

    #[test]
    fn test_wrong_issuer_or_audience() {
        let (issuer, _) = pair();
        let issued = issuer.issue(&user(), RoleSet::new()).unwrap();

        let other_issuer = TokenValidator::new(keys(SECRET, "elsewhere", "shop"));
        let other_audience = TokenValidator::new(keys(SECRET, "ripperdoc", "admin-panel"));
        assert_eq!(
            other_issuer.validate(&issued.token),
            Err(TokenRejection::WrongIssuerOrAudience)
        );
        assert_eq!(
            other_audience.validate(&issued.token),
            Err(TokenRejection::WrongIssuerOrAudience)
        );
    }

    #[test]
    fn test_signature_checked_before_expiry() {
        let (issuer, _) = pair();
        let other = TokenValidator::new(keys(b"ffffffffffffffffffffffffffffffff", "ripperdoc", "shop"));
        let issued = issuer.issue_at(&user(), RoleSet::new(), at(1_000)).unwrap();
        assert_eq!(
            other.validate_at(&issued.token, at(1_000_000)),
            Err(TokenRejection::BadSignature)
        );
    }

    #[test]
    fn test_audience_checked_before_expiry() {
        let (issuer, _) = pair();
        let other = TokenValidator::new(keys(SECRET, "ripperdoc", "admin-panel"));
        let issued = issuer.issue_at(&user(), RoleSet::new(), at(1_000)).unwrap();
        assert_eq!(
            other.validate_at(&issued.token, at(1_000_000)),
            Err(TokenRejection::WrongIssuerOrAudience)
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        let (_, validator) = pair();
        for raw in ["", "abc", "not.a.token", "a.b.c.d"] {
            assert_eq!(validator.validate(raw), Err(TokenRejection::Malformed), "{raw}");
        }
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let (issuer, validator) = pair();
        let issued = issuer.issue(&user(), role_set(["Customer"])).unwrap();

        // Same issuer and audience, different key: splice its claims onto the
        // genuine signature.
        let forger = TokenIssuer::new(keys(b"ffffffffffffffffffffffffffffffff", "ripperdoc", "shop"));
        let forged = forger.issue(&user(), role_set(["Admin"])).unwrap();
        let (forged_body, _) = forged.token.rsplit_once('.').unwrap();
        let (_, genuine_sig) = issued.token.rsplit_once('.').unwrap();
        let spliced = format!("{forged_body}.{genuine_sig}");

        assert_eq!(validator.validate(&spliced), Err(TokenRejection::BadSignature));
    }

    #[test]
    fn test_roles_are_a_snapshot() {
        let (issuer, validator) = pair();
        let mut roles = role_set(["Customer"]);
        let issued = issuer.issue(&user(), roles.clone()).unwrap();

        roles.insert("Admin".into());
        let claims = validator.validate(&issued.token).unwrap();
        assert_eq!(claims.roles, role_set(["Customer"]));
    }

    #[test]
    fn test_short_secret_rejected() {
        let err = JwtKeys::new(b"too-short", "ripperdoc", "shop", HOUR).unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
    }

    #[test]
    fn test_blank_issuer_rejected() {
        assert!(JwtKeys::new(SECRET, " ", "shop", HOUR).is_err());
        assert!(JwtKeys::new(SECRET, "ripperdoc", "", HOUR).is_err());
        assert!(JwtKeys::new(SECRET, "ripperdoc", "shop", std::time::Duration::ZERO).is_err());
    }

    #[test]
    fn test_debug_hides_secret_and_token() {
        let (issuer, _) = pair();
        let issued = issuer.issue(&user(), RoleSet::new()).unwrap();
        assert!(!format!("{issued:?}").contains(&issued.token));
        assert!(!format!("{:?}", keys(SECRET, "ripperdoc", "shop")).contains("0123456789"));
    }
}
