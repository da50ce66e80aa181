use crate::error::AppError;
use crate::middleware::auth::CurrentUser;
use crate::router::AppState;
use crate::service::accounts::{self, DeviceInfo};
use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub device: Option<DeviceInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// POST /auth/login -> verifies credentials, issues a bearer token, and
/// records the calling device when one is supplied.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    let (session, user) = accounts::login(
        &state.store,
        &req.username,
        &req.password,
        state.session_ttl_hours,
    )
    .await?;

    if let Some(device) = &req.device {
        // Device bookkeeping must not block a successful login.
        if let Err(e) = accounts::record_device(&state.store, &session.user_id, device).await {
            warn!(user_id = %session.user_id, error = %e, "failed to record login device");
        }
    }

    Ok(Json(json!({
        "token": session.token,
        "expires_at": session.expires_at,
        "user": user,
    })))
}

/// POST /auth/change-password -> re-verifies the current password and stores
/// a hash of the new one.
pub async fn change_password(
    caller: CurrentUser,
    State(state): State<AppState>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, AppError> {
    if req.new_password.trim().is_empty() {
        return Err(AppError::InvalidDocument(
            "new password must not be empty".into(),
        ));
    }
    accounts::change_password(
        &state.store,
        &caller.user_id,
        &req.current_password,
        &req.new_password,
    )
    .await?;
    Ok(Json(json!({ "ok": true })))
}
