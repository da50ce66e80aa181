//! Account service: password hashing, credential verification, admin
//! bootstrap, and session issuance.

use crate::collections;
use crate::db::models::DbSession;
use crate::db::{DocumentStore, FilterValue};
use crate::error::AppError;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use uuid::Uuid;

/// Optional device block accepted by the login endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Salted SHA-256, stored as `salt$hex`.
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    format!("{salt}${}", digest_hex(&salt, password))
}

/// Constant-time comparison against a stored `salt$hex` value.
pub fn verify_password(stored: &str, candidate: &str) -> bool {
    let Some((salt, hex)) = stored.split_once('$') else {
        return false;
    };
    let computed = digest_hex(salt, candidate);
    bool::from(computed.as_bytes().ct_eq(hex.as_bytes()))
}

fn digest_hex(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Create the bootstrap admin account when the users collection is empty.
pub async fn seed_admin(
    store: &DocumentStore,
    username: &str,
    password: &str,
) -> Result<(), AppError> {
    let existing = store
        .count(collections::USERS, &Default::default())
        .await?;
    if existing > 0 {
        return Ok(());
    }
    let id = Uuid::new_v4().to_string();
    let user = json!({
        "id": id,
        "username": username,
        "name": "Administrator",
        "role": "admin",
        "active": true,
        "password_hash": hash_password(password),
    });
    store.insert(collections::USERS, &id, &user).await?;
    info!(username, "seeded bootstrap admin account");
    Ok(())
}

/// Verify credentials and issue a session. Always runs the password hash on
/// failure paths too, so response timing does not reveal whether the
/// username exists.
pub async fn login(
    store: &DocumentStore,
    username: &str,
    password: &str,
    ttl_hours: i64,
) -> Result<(DbSession, Value), AppError> {
    let user = store
        .find_one(
            collections::USERS,
            "username",
            FilterValue::text(username),
        )
        .await?;

    let Some(mut user) = user else {
        let _ = verify_password("x$unknown", password);
        return Err(AppError::InvalidCredentials);
    };

    let active = user.get("active").and_then(|v| v.as_bool()).unwrap_or(false);
    let stored = user
        .get("password_hash")
        .and_then(|v| v.as_str())
        .unwrap_or("x$unset")
        .to_string();

    if !verify_password(&stored, password) || !active {
        warn!(username, "rejected login attempt");
        return Err(AppError::InvalidCredentials);
    }

    let user_id = user
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let now = Utc::now();
    let session = DbSession {
        token: Uuid::new_v4().simple().to_string(),
        user_id,
        created_at: now,
        expires_at: now + Duration::hours(ttl_hours),
    };
    store.create_session(&session).await?;

    collections::redact(collections::USERS, &mut user);
    info!(username, "login succeeded");
    Ok((session, user))
}

/// Rotate a user's password after re-verifying the current one.
pub async fn change_password(
    store: &DocumentStore,
    user_id: &str,
    current: &str,
    new: &str,
) -> Result<(), AppError> {
    let user = store
        .get(collections::USERS, user_id)
        .await?
        .ok_or(AppError::Unauthenticated)?;
    let stored = user
        .get("password_hash")
        .and_then(|v| v.as_str())
        .unwrap_or("x$unset");
    if !verify_password(stored, current) {
        return Err(AppError::InvalidCredentials);
    }
    let patch = json!({ "password_hash": hash_password(new) });
    store.update(collections::USERS, user_id, &patch).await
}

/// Upsert the caller's device record, keyed by (user, device). Repeated
/// logins from the same device refresh `last_seen_at` on the single row.
pub async fn record_device(
    store: &DocumentStore,
    user_id: &str,
    device: &DeviceInfo,
) -> Result<(), AppError> {
    // Deterministic id makes the (user_id, device_id) pair the upsert key.
    let id = format!("{user_id}:{}", device.device_id);
    let doc = json!({
        "id": id,
        "user_id": user_id,
        "device_id": device.device_id,
        "platform": device.platform,
        "user_agent": device.user_agent,
        "last_seen_at": Utc::now(),
    });
    let doc = collections::normalize(collections::USER_DEVICES, &doc)?;
    store.upsert(collections::USER_DEVICES, &id, &doc).await
}
