//! `POST /auth/login|refresh|logout`.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use computor_auth::password::verify_password;
use computor_core::ApiError;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub user_id: Uuid,
    pub token_type: &'static str,
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let (user_id, password_hash) = state
        .repositories
        .resolve_password_user(&payload.username)
        .await?
        .ok_or_else(|| ApiError::authentication("invalid username or password"))?;

    if !verify_password(&payload.password, &password_hash)? {
        return Err(ApiError::authentication("invalid username or password"));
    }

    let tokens = state.sessions.login(user_id, None, None, None).await?;

    Ok(Json(AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_in: tokens.expires_in,
        user_id,
        token_type: "Bearer",
    }))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub expires_in: i64,
    pub refresh_token: String,
    pub token_type: &'static str,
}

async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let tokens = state.sessions.refresh(&payload.refresh_token).await?;
    Ok(Json(RefreshResponse {
        access_token: tokens.access_token,
        expires_in: tokens.expires_in,
        refresh_token: payload.refresh_token,
        token_type: "Bearer",
    }))
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: &'static str,
}

async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<LogoutRequest>,
) -> Result<Json<LogoutResponse>, ApiError> {
    state.sessions.logout(&payload.access_token, &payload.refresh_token).await?;
    Ok(Json(LogoutResponse { message: "logged out" }))
}
