//! Gateway server.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{FromRef, Path, State},
    http::{Request, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use ripperdoc_core::secrets::COMMON_SECRET_PATTERNS;
use ripperdoc_core::{Config, RoleName, RoleSet, SecretValue, UserId, scrub_secrets};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use zeroize::Zeroizing;

use crate::GatewayError;
use crate::auth::{
    AuthConfig, AuthError, AuthState, CredentialStore, PublicUser, RequireAdmin, RequireAuth,
    SeedReport, SledCredentialStore, access_cookie, clear_cookie, seed,
};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Port to listen on.
    pub port: u16,
    /// Bind address.
    pub bind_address: String,
    /// Credential database directory.
    pub data_dir: PathBuf,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Bootstrap administrator email.
    pub admin_email: String,
    /// Bootstrap administrator password.
    pub admin_password: SecretValue,
}

impl GatewayConfig {
    /// Derive gateway settings from a loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns error if any value required at startup is missing or invalid.
    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        config
            .validate_for_startup()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        let auth = AuthConfig::from_config(config).map_err(|e| GatewayError::Config(e.to_string()))?;
        let admin_email = config
            .admin
            .email
            .clone()
            .ok_or_else(|| GatewayError::Config("Admin email is required".to_string()))?;
        let admin_password = config
            .admin
            .password
            .clone()
            .ok_or_else(|| GatewayError::Config("Admin password is required".to_string()))?;

        Ok(Self {
            port: config.gateway.port,
            bind_address: config.gateway.mode.address(),
            data_dir: config.data_dir(),
            auth,
            admin_email,
            admin_password,
        })
    }

    /// `host:port` to bind.
    #[must_use]
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Gateway server state shared across handlers.
#[derive(Debug, Clone, FromRef)]
pub struct GatewayState {
    /// Authentication state.
    pub auth: Arc<AuthState>,
}

/// Gateway server.
#[derive(Debug)]
pub struct Gateway {
    config: GatewayConfig,
    state: GatewayState,
}

impl Gateway {
    /// Create a gateway over the sled store in `config.data_dir`.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be opened or keys cannot be built.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| GatewayError::Config(format!("Failed to create data dir: {e}")))?;

        let store = Arc::new(SledCredentialStore::open(&config.data_dir)?);
        Self::with_store(config, store)
    }

    /// Create a gateway over an existing credential store.
    ///
    /// # Errors
    ///
    /// Returns error if the signing keys cannot be built.
    pub fn with_store(
        config: GatewayConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, GatewayError> {
        let auth = Arc::new(AuthState::new(config.auth.clone(), store)?);
        Ok(Self {
            config,
            state: GatewayState { auth },
        })
    }

    /// Shared state.
    #[must_use]
    pub const fn state(&self) -> &GatewayState {
        &self.state
    }

    /// Ensure required roles and the administrator exist.
    ///
    /// # Errors
    ///
    /// Returns `Bootstrap` on any failure; the server must not start.
    pub fn seed(&self) -> Result<SeedReport, GatewayError> {
        seed(
            self.state.auth.store.as_ref(),
            &self.config.admin_email,
            &self.config.admin_password,
        )
        .map_err(GatewayError::Bootstrap)
    }

    /// Build the HTTP router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/api/auth/register", post(register_handler))
            .route("/api/auth/login", post(login_handler))
            .route("/api/auth/logout", post(logout_handler))
            .route("/api/auth/me", get(me_handler))
            .route("/api/admin/users", get(list_users_handler))
            .route("/api/admin/users/{id}/disable", post(disable_user_handler))
            .route("/api/admin/users/{id}/enable", post(enable_user_handler))
            .route("/api/admin/users/{id}/roles", post(assign_role_handler))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let uri = scrub_secrets(&request.uri().to_string(), COMMON_SECRET_PATTERNS);
                tracing::info_span!("http", method = %request.method(), uri = %uri)
            }))
            .with_state(self.state.clone())
    }

    /// Seed, then serve until Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns error if seeding fails, the listener cannot bind, or the
    /// server stops abnormally.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let store = self.state.auth.store.clone();
        let email = self.config.admin_email.clone();
        let password = self.config.admin_password.clone();
        let report = tokio::task::spawn_blocking(move || seed(store.as_ref(), &email, &password))
            .await
            .map_err(|e| GatewayError::Server(format!("Seeding task failed: {e}")))?
            .map_err(|e| {
                tracing::error!(error = %e, "Bootstrap failed, refusing to serve");
                GatewayError::Bootstrap(e)
            })?;
        tracing::info!(
            roles_created = report.roles_created.len(),
            admin_created = report.admin_created,
            "Bootstrap complete"
        );

        let address = self.config.listen_address();
        let listener = tokio::net::TcpListener::bind(&address).await?;
        tracing::info!(address = %address, "Gateway listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| GatewayError::Server(e.to_string()))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Email and password body. The password is wiped on drop.
#[derive(Deserialize)]
struct Credentials {
    email: String,
    password: Zeroizing<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    token_type: &'static str,
    expires_at: DateTime<Utc>,
    user: PublicUser,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MeResponse {
    id: UserId,
    email: String,
    roles: RoleSet,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct AssignRoleRequest {
    role: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssignRoleResponse {
    granted: bool,
    user: PublicUser,
}

/// Run blocking auth work (hashing, storage) off the async workers.
async fn blocking<T, F>(work: F) -> Result<T, AuthError>
where
    F: FnOnce() -> Result<T, AuthError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AuthError::Internal(format!("Blocking task failed: {e}")))?
}

async fn register_handler(
    State(auth): State<Arc<AuthState>>,
    Json(body): Json<Credentials>,
) -> Result<impl IntoResponse, AuthError> {
    let user = blocking(move || auth.register(&body.email, &body.password)).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login_handler(
    State(auth): State<Arc<AuthState>>,
    Json(body): Json<Credentials>,
) -> Result<impl IntoResponse, AuthError> {
    let worker = auth.clone();
    let outcome = blocking(move || worker.login(&body.email, &body.password)).await?;
    let cookie = access_cookie(&auth.config, &outcome.token.token);

    Ok((
        [(SET_COOKIE, cookie)],
        Json(LoginResponse {
            token: outcome.token.token,
            token_type: "Bearer",
            expires_at: outcome.token.expires_at,
            user: outcome.user,
        }),
    ))
}

/// Clears the cookie. Tokens are stateless: one already handed out stays
/// valid until it expires.
async fn logout_handler(State(auth): State<Arc<AuthState>>) -> impl IntoResponse {
    (
        [(SET_COOKIE, clear_cookie(&auth.config))],
        Json(serde_json::json!({ "success": true })),
    )
}

async fn me_handler(auth: RequireAuth) -> Json<MeResponse> {
    let expires_at = auth.claims.expires_at();
    Json(MeResponse {
        id: auth.claims.sub,
        email: auth.claims.email,
        roles: auth.claims.roles,
        expires_at,
    })
}

async fn list_users_handler(
    _admin: RequireAdmin,
    State(auth): State<Arc<AuthState>>,
) -> Result<Json<Vec<PublicUser>>, AuthError> {
    let users = blocking(move || {
        let mut users = auth
            .store
            .list_users()?
            .into_iter()
            .map(|user| -> Result<PublicUser, AuthError> {
                let roles = auth.store.list_roles(user.id)?;
                Ok(user.to_public(roles))
            })
            .collect::<Result<Vec<_>, _>>()?;
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    })
    .await?;
    Ok(Json(users))
}

async fn disable_user_handler(
    admin: RequireAdmin,
    State(auth): State<Arc<AuthState>>,
    Path(id): Path<String>,
) -> Result<Json<PublicUser>, AuthError> {
    let id = parse_user_id(&id)?;
    if id == admin.auth.user_id() {
        return Err(AuthError::Validation(
            "Administrators cannot disable their own account".to_string(),
        ));
    }
    set_disabled(auth, id, true).await
}

async fn enable_user_handler(
    _admin: RequireAdmin,
    State(auth): State<Arc<AuthState>>,
    Path(id): Path<String>,
) -> Result<Json<PublicUser>, AuthError> {
    set_disabled(auth, parse_user_id(&id)?, false).await
}

async fn set_disabled(
    auth: Arc<AuthState>,
    id: UserId,
    disabled: bool,
) -> Result<Json<PublicUser>, AuthError> {
    let user = blocking(move || {
        let user = auth.store.set_disabled(id, disabled)?;
        let roles = auth.store.list_roles(id)?;
        Ok(user.to_public(roles))
    })
    .await?;
    Ok(Json(user))
}

async fn assign_role_handler(
    _admin: RequireAdmin,
    State(auth): State<Arc<AuthState>>,
    Path(id): Path<String>,
    Json(body): Json<AssignRoleRequest>,
) -> Result<Json<AssignRoleResponse>, AuthError> {
    let id = parse_user_id(&id)?;
    let role = RoleName::new(body.role.trim());
    let response = blocking(move || {
        let granted = auth.store.assign_role(id, &role)?;
        let user = auth
            .store
            .find_user_by_id(id)?
            .ok_or_else(|| AuthError::UserNotFound(id.to_string()))?;
        let roles = auth.store.list_roles(id)?;
        Ok(AssignRoleResponse {
            granted,
            user: user.to_public(roles),
        })
    })
    .await?;
    Ok(Json(response))
}

fn parse_user_id(raw: &str) -> Result<UserId, AuthError> {
    raw.parse()
        .map_err(|_| AuthError::Validation(format!("Invalid user id: {raw}")))
}
