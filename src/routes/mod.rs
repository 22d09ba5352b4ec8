use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path as FsPath;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::db::users::{self, NewUser, User, UserError};
use crate::db::{sessions, Database};
use crate::error::ApiError;
use crate::relay::{RefreshRequest, TokenPair, TOKENS_PATH};
use crate::tokens::{RefreshToken, TokenIssuer};

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

const USERS_PATH: &str = "/api/v1/users";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub issuer: Arc<TokenIssuer>,
}

/// Health check routes
pub fn health_routes() -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
}

/// Token and user API routes
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route(TOKENS_PATH, post(create_token_handler))
        .route(USERS_PATH, post(register_handler))
        .route(&format!("{}/:uuid", USERS_PATH), get(get_user_handler))
        .with_state(state)
}

/// Full application: API, health checks, and the relay page's static assets
pub fn app(state: AppState, static_dir: Option<&FsPath>) -> Router {
    let router = Router::new()
        .merge(health_routes())
        .merge(api_routes(state));

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router.layer(TraceLayer::new_for_http())
}

/// GET / - Simple health check
async fn root_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "SSO server is running",
        "version": VERSION
    }))
}

/// GET /health - Detailed health check
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": VERSION
    }))
}

/// Public view of a user
#[derive(Debug, Serialize, Deserialize)]
pub struct UserView {
    pub uuid: String,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            uuid: user.uuid,
            name: user.name,
            email: user.email,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub item: UserView,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// POST /api/v1/tokens - Issue a token pair
///
/// The user is identified by exactly one of `name`/`email` and authenticated
/// by exactly one of `password`/`refresh_token`. A refresh token is single
/// use: its session is replaced by the newly issued one.
async fn create_token_handler(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = find_user(&state.db, &request)?
        .ok_or_else(|| ApiError::bad_request("User not found"))?;

    let refresh_token = RefreshToken::generate();

    match (request.password, request.refresh_token) {
        (Some(password), None) => {
            let candidate = user.clone();
            let verified = tokio::task::spawn_blocking(move || candidate.verify_password(&password))
                .await
                .context("Password verification task failed")?;

            if !verified {
                tracing::info!(user = %user.uuid, "Token request with incorrect password");
                return Err(ApiError::bad_request("Incorrect password"));
            }

            state
                .db
                .with_conn(|conn| Ok(sessions::create(conn, user.id, refresh_token.as_str())?))?;
        }
        (None, Some(presented)) => {
            let rotated = state.db.with_conn(|conn| {
                match sessions::get_by_token(conn, user.id, &presented)? {
                    Some(session) => Ok(Some(sessions::rotate(
                        conn,
                        &session,
                        refresh_token.as_str(),
                    )?)),
                    None => Ok(None),
                }
            })?;

            if rotated.is_none() {
                tracing::info!(user = %user.uuid, "Token request with unknown refresh token");
                return Err(ApiError::bad_request("Incorrect refresh token"));
            }
        }
        _ => {
            return Err(ApiError::bad_request(
                "Either password or refresh_token required",
            ))
        }
    }

    let access_token = state.issuer.issue(&user)?;
    tracing::info!(user = %user.uuid, "Issued token pair");

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, TOKENS_PATH.to_string())],
        Json(TokenPair {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
        }),
    ))
}

fn find_user(db: &Database, request: &RefreshRequest) -> Result<Option<User>, ApiError> {
    match (&request.name, &request.email) {
        (Some(name), None) => Ok(db.with_conn(|conn| Ok(users::get_by_name(conn, name)?))?),
        (None, Some(email)) => Ok(db.with_conn(|conn| Ok(users::get_by_email(conn, email)?))?),
        _ => Err(ApiError::bad_request("Either name or email required")),
    }
}

/// POST /api/v1/users - Register a user
async fn register_handler(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.name.trim().is_empty()
        || request.email.trim().is_empty()
        || request.password.is_empty()
    {
        return Err(ApiError::bad_request("name, email and password are required"));
    }

    let new_user = tokio::task::spawn_blocking(move || {
        NewUser::new(&request.name, &request.email, &request.password)
    })
    .await
    .context("Password hashing task failed")??;

    let created = state
        .db
        .with_conn(|conn| Ok(users::create(conn, &new_user)))?;

    let user = match created {
        Ok(user) => user,
        Err(UserError::AlreadyExists(who)) => {
            return Err(ApiError::bad_request(format!("User '{}' already exists", who)))
        }
        Err(UserError::Database(e)) => {
            return Err(anyhow::Error::from(e)
                .context("Failed to create user")
                .into())
        }
    };

    tracing::info!(user = %user.uuid, "Registered user");

    let location = format!("{}/{}", USERS_PATH, user.uuid);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(UserResponse { item: user.into() }),
    ))
}

/// GET /api/v1/users/:uuid - Read the caller's own profile
///
/// Requires `Authorization: Bearer <access token>`. Other users' profiles are
/// reported as not found.
async fn get_user_handler(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
) -> Result<Json<UserResponse>, ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Missing access token".to_string()))?;

    let claims = state.issuer.validate(token).map_err(|e| {
        tracing::debug!("Rejected access token: {}", e);
        ApiError::Unauthorized("Invalid access token".to_string())
    })?;

    if claims.user_uuid != uuid {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    let user = state
        .db
        .with_conn(|conn| Ok(users::get_by_uuid(conn, &uuid)?))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(UserResponse { item: user.into() }))
}
