use crate::collections;
use crate::error::AppError;
use crate::router::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde_json::Value;

/// Resolved caller identity for authenticated routes.
///
/// Accepts `Authorization: Bearer <token>`, resolves the token against the
/// sessions table, and loads the caller's (redacted) user document. Expired
/// sessions are purged by the lookup itself.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: String,
    pub user: Value,
    pub token: String,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthenticated)?;

        let session = state
            .store
            .get_session(&token)
            .await?
            .ok_or(AppError::Unauthenticated)?;

        let mut user = state
            .store
            .get(collections::USERS, &session.user_id)
            .await?
            .ok_or(AppError::Unauthenticated)?;

        let active = user.get("active").and_then(|v| v.as_bool()).unwrap_or(false);
        if !active {
            return Err(AppError::Unauthenticated);
        }
        collections::redact(collections::USERS, &mut user);

        Ok(CurrentUser {
            user_id: session.user_id,
            user,
            token,
        })
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let auth = parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())?
        .trim();
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}
