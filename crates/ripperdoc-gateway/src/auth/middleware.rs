//! Authentication state and axum extractors.

use std::marker::PhantomData;
use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, HeaderValue, StatusCode, header::WWW_AUTHENTICATE, request::Parts},
    response::{IntoResponse, Response},
};
use ripperdoc_core::{RoleName, RoleSet, UserId, normalize_email, role_set, validate_password};
use serde::Serialize;

use super::AuthError;
use super::config::AuthConfig;
use super::gate::{Decision, authorize};
use super::jwt::{Claims, IssuedToken, JwtKeys, TokenIssuer, TokenValidator};
use super::store::CredentialStore;
use super::transport::extract_token;
use super::users::{NewUser, PublicUser, hash_password, verify_dummy};
use crate::middleware::LoginRateLimiter;

/// Shared authentication state.
pub struct AuthState {
    /// Auth configuration.
    pub config: AuthConfig,
    /// Token issuer.
    pub issuer: TokenIssuer,
    /// Token validator.
    pub validator: TokenValidator,
    /// Credential store.
    pub store: Arc<dyn CredentialStore>,
    login_limiter: LoginRateLimiter,
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// The authenticated user.
    pub user: PublicUser,
    /// The token issued for this session.
    pub token: IssuedToken,
}

impl AuthState {
    /// Create auth state, building the signing keys once.
    ///
    /// # Errors
    ///
    /// Returns error if the signing keys cannot be built.
    pub fn new(config: AuthConfig, store: Arc<dyn CredentialStore>) -> Result<Self, AuthError> {
        let keys = Arc::new(JwtKeys::from_config(&config)?);
        let login_limiter = LoginRateLimiter::new(config.login_rate_limit);

        Ok(Self {
            issuer: TokenIssuer::new(keys.clone()),
            validator: TokenValidator::new(keys),
            config,
            store,
            login_limiter,
        })
    }

    /// Authenticate a request from its headers.
    ///
    /// With `trust_token_claims` off, the subject is re-read from the store:
    /// a disabled or deleted user is refused and roles reflect the store.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` or `AccountUnavailable`, or a storage error.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Claims, AuthError> {
        let claims = extract_token(headers, &self.config.cookie_name)
            .and_then(|token| self.validator.validate(&token))
            .inspect_err(|reason| tracing::debug!(%reason, "Rejected bearer credential"))?;

        if self.config.trust_token_claims {
            Ok(claims)
        } else {
            self.refresh_claims(claims)
        }
    }

    /// Replace the role snapshot in `claims` with the store's current view.
    ///
    /// # Errors
    ///
    /// Returns `AccountUnavailable` if the subject is gone or disabled.
    pub fn refresh_claims(&self, mut claims: Claims) -> Result<Claims, AuthError> {
        let user = match self.store.find_user_by_id(claims.sub)? {
            Some(user) if !user.disabled => user,
            _ => {
                tracing::debug!(user_id = %claims.sub, "Token subject unavailable");
                return Err(AuthError::AccountUnavailable);
            }
        };
        claims.roles = self.store.list_roles(user.id)?;
        claims.email = user.email;
        Ok(claims)
    }

    /// Check credentials and issue a token.
    ///
    /// Unknown email, wrong password and disabled account all produce the
    /// same `InvalidCredentials`, after the same amount of hashing work.
    /// Blocks on password hashing; call from a blocking context.
    ///
    /// # Errors
    ///
    /// Returns `RateLimited`, `InvalidCredentials`, or a storage error.
    pub fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let email = normalize_email(email).unwrap_or_else(|_| email.trim().to_lowercase());
        if !self.login_limiter.check(&email) {
            tracing::warn!(email = %email, "Login rate limit exceeded");
            return Err(AuthError::RateLimited);
        }

        let Some(user) = self.store.find_user_by_email(&email)? else {
            verify_dummy(password);
            tracing::debug!(email = %email, "Login for unknown email");
            return Err(AuthError::InvalidCredentials);
        };
        if !self.store.verify_password(&user, password) {
            tracing::debug!(user_id = %user.id, "Login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }
        if user.disabled {
            tracing::debug!(user_id = %user.id, "Login for disabled account");
            return Err(AuthError::InvalidCredentials);
        }

        let roles = self.store.list_roles(user.id)?;
        let token = self.issuer.issue(&user, roles.clone())?;

        if let Err(e) = self.store.record_login(user.id) {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to record login time");
        }
        tracing::info!(user_id = %user.id, "User logged in");

        Ok(LoginOutcome {
            user: user.to_public(roles),
            token,
        })
    }

    /// Create a customer account.
    ///
    /// Blocks on password hashing; call from a blocking context.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a bad email or password, `UserExists` on a
    /// duplicate email.
    pub fn register(&self, email: &str, password: &str) -> Result<PublicUser, AuthError> {
        let email = normalize_email(email)?;
        validate_password(password)?;

        let user = self.store.insert_user(&NewUser {
            email,
            password_hash: hash_password(password)?,
            roles: role_set([RoleName::CUSTOMER]),
        })?;
        tracing::info!(user_id = %user.id, "Registered customer");

        Ok(user.to_public(role_set([RoleName::CUSTOMER])))
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("config", &self.config)
            .field("login_limiter", &self.login_limiter)
            .finish_non_exhaustive()
    }
}

/// Extractor for authenticated requests.
///
/// Use this in handler parameters to require authentication without any
/// particular role.
#[derive(Debug, Clone)]
pub struct RequireAuth {
    /// The authenticated user's claims.
    pub claims: Claims,
}

impl RequireAuth {
    /// Get the user ID.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.claims.sub
    }

    /// Get the email.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.claims.email
    }

    /// Get the held roles.
    #[must_use]
    pub const fn roles(&self) -> &RoleSet {
        &self.claims.roles
    }

    /// Check for a single role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.claims.roles.iter().any(|r| r.as_str() == role)
    }
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
    Arc<AuthState>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = Arc::<AuthState>::from_ref(state);
        let claims = auth_state.authenticate(&parts.headers)?;
        Ok(Self { claims })
    }
}

/// Role requirement attached to a route by type.
pub trait RoleRequirement: Send + Sync + 'static {
    /// Roles of which at least one must be held.
    fn required() -> RoleSet;
}

/// Requires the `Admin` role.
#[derive(Debug, Clone, Copy)]
pub struct AdminRole;

impl RoleRequirement for AdminRole {
    fn required() -> RoleSet {
        role_set([RoleName::ADMIN])
    }
}

/// Extractor that authenticates and then checks a role requirement.
///
/// Fails with 401 when unauthenticated and 403 when no required role is held.
#[derive(Debug, Clone)]
pub struct RequireRoles<R> {
    /// The authenticated request.
    pub auth: RequireAuth,
    _requirement: PhantomData<R>,
}

/// Require admin role extractor.
pub type RequireAdmin = RequireRoles<AdminRole>;

impl<S, R> FromRequestParts<S> for RequireRoles<R>
where
    S: Send + Sync,
    R: RoleRequirement,
    Arc<AuthState>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = RequireAuth::from_request_parts(parts, state).await?;

        match authorize(&auth.claims, &R::required()) {
            Decision::Allowed => Ok(Self {
                auth,
                _requirement: PhantomData,
            }),
            Decision::Denied => {
                tracing::debug!(user_id = %auth.user_id(), "Missing required role");
                Err(AuthError::InsufficientRole)
            }
        }
    }
}

/// Error response for auth failures.
#[derive(Debug, Serialize)]
struct AuthErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // Every 401 is byte-identical so callers cannot tell the causes apart.
        if self.is_unauthenticated() {
            let body = AuthErrorResponse {
                error: "Unauthorized".to_string(),
                code: "unauthorized",
            };
            let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            return response;
        }

        let (status, code, error) = match &self {
            Self::InsufficientRole => (StatusCode::FORBIDDEN, "forbidden", "Forbidden".to_string()),
            Self::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                self.to_string(),
            ),
            Self::UserNotFound(_) | Self::RoleNotFound(_) => {
                (StatusCode::NOT_FOUND, "not_found", self.to_string())
            }
            Self::UserExists(_) | Self::RoleExists(_) => {
                (StatusCode::CONFLICT, "conflict", self.to_string())
            }
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_input", self.to_string()),
            _ => {
                tracing::error!(error = %self, "Internal auth failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal error".to_string(),
                )
            }
        };

        (status, Json(AuthErrorResponse { error, code })).into_response()
    }
}
