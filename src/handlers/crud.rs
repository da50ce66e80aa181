//! Generic REST handlers for the registered collections.
//!
//! `GET/POST /api/{collection}` and `GET/PUT/DELETE /api/{collection}/{id}`
//! map 1:1 onto the document store's find/insert/update/delete, with `count`
//! feeding the `X-Total-Count` list header. Query-string parameters are
//! equality filters except the reserved `_limit`/`_offset`/`_sort`/`_order`.

use crate::collections;
use crate::db::{FilterValue, ListQuery, SortOrder};
use crate::error::AppError;
use crate::middleware::auth::CurrentUser;
use crate::router::AppState;
use crate::service::accounts;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

fn ensure_registered(collection: &str) -> Result<(), AppError> {
    if collections::is_registered(collection) {
        Ok(())
    } else {
        Err(AppError::UnknownCollection(collection.to_string()))
    }
}

fn parse_list_query(params: Vec<(String, String)>) -> Result<ListQuery, AppError> {
    let mut query = ListQuery::default();
    let mut sort_field: Option<String> = None;
    let mut sort_order = SortOrder::Asc;

    for (key, value) in params {
        match key.as_str() {
            "_limit" => {
                let n = value
                    .parse::<i64>()
                    .map_err(|_| AppError::InvalidQuery("_limit must be an integer".into()))?;
                query.limit = Some(n);
            }
            "_offset" => {
                let n = value
                    .parse::<i64>()
                    .map_err(|_| AppError::InvalidQuery("_offset must be an integer".into()))?;
                query.offset = Some(n);
            }
            "_sort" => sort_field = Some(value),
            "_order" => {
                sort_order = match value.as_str() {
                    "asc" | "ASC" => SortOrder::Asc,
                    "desc" | "DESC" => SortOrder::Desc,
                    other => {
                        return Err(AppError::InvalidQuery(format!(
                            "_order must be asc or desc, got {other:?}"
                        )));
                    }
                };
            }
            _ => query.filters.push((key, FilterValue::parse(&value))),
        }
    }

    query.sort = sort_field.map(|f| (f, sort_order));
    Ok(query)
}

/// For `users`, replace a plaintext `password` field with its hash before the
/// body is validated or stored.
fn absorb_password(collection: &str, body: &mut Value) {
    if collection != collections::USERS {
        return;
    }
    let Some(obj) = body.as_object_mut() else {
        return;
    };
    if let Some(plain) = obj.remove("password").and_then(|v| match v {
        Value::String(s) => Some(s),
        _ => None,
    }) {
        obj.insert(
            "password_hash".to_string(),
            Value::String(accounts::hash_password(&plain)),
        );
    }
}

pub async fn list(
    _caller: CurrentUser,
    Path(collection): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    ensure_registered(&collection)?;
    let query = parse_list_query(params)?;

    let total = state.store.count(&collection, &query).await?;
    let mut items = state.store.find(&collection, &query).await?;
    for item in &mut items {
        collections::redact(&collection, item);
    }

    debug!(collection, total, returned = items.len(), "list");
    Ok(([("x-total-count", total.to_string())], Json(items)))
}

pub async fn fetch(
    _caller: CurrentUser,
    Path((collection, id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    ensure_registered(&collection)?;
    let mut doc = state
        .store
        .get(&collection, &id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            collection: collection.clone(),
            id: id.clone(),
        })?;
    collections::redact(&collection, &mut doc);
    Ok(Json(doc))
}

pub async fn insert(
    _caller: CurrentUser,
    Path(collection): Path<String>,
    State(state): State<AppState>,
    Json(mut body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    ensure_registered(&collection)?;
    let obj = body
        .as_object_mut()
        .ok_or_else(|| AppError::InvalidDocument("document must be a JSON object".into()))?;

    let id = match obj.get("id").and_then(|v| v.as_str()) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            let id = Uuid::new_v4().to_string();
            obj.insert("id".to_string(), Value::String(id.clone()));
            id
        }
    };

    absorb_password(&collection, &mut body);
    let mut doc = collections::normalize(&collection, &body)?;
    state.store.insert(&collection, &id, &doc).await?;

    debug!(collection, id, "inserted document");
    collections::redact(&collection, &mut doc);
    Ok((StatusCode::CREATED, Json(doc)))
}

pub async fn update(
    _caller: CurrentUser,
    Path((collection, id)): Path<(String, String)>,
    State(state): State<AppState>,
    Json(mut patch): Json<Value>,
) -> Result<Json<Value>, AppError> {
    ensure_registered(&collection)?;
    if !patch.is_object() {
        return Err(AppError::InvalidDocument(
            "patch must be a JSON object".into(),
        ));
    }
    if let Some(patched_id) = patch.get("id").and_then(|v| v.as_str())
        && patched_id != id
    {
        return Err(AppError::InvalidDocument("id is immutable".into()));
    }

    let existing = state
        .store
        .get(&collection, &id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            collection: collection.clone(),
            id: id.clone(),
        })?;

    absorb_password(&collection, &mut patch);

    // Check typing against the merged result; the store applies the same
    // merge via json_patch.
    let mut merged = existing;
    if let (Some(target), Some(changes)) = (merged.as_object_mut(), patch.as_object()) {
        for (key, value) in changes {
            if value.is_null() {
                target.remove(key);
            } else {
                target.insert(key.clone(), value.clone());
            }
        }
    }
    let mut merged = collections::normalize(&collection, &merged)?;

    state.store.update(&collection, &id, &patch).await?;
    debug!(collection, id, "updated document");

    collections::redact(&collection, &mut merged);
    Ok(Json(merged))
}

pub async fn remove(
    _caller: CurrentUser,
    Path((collection, id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    ensure_registered(&collection)?;
    state.store.delete(&collection, &id).await?;
    debug!(collection, id, "deleted document");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_params_do_not_become_filters() {
        let query = parse_list_query(vec![
            ("_limit".into(), "10".into()),
            ("_offset".into(), "20".into()),
            ("_sort".into(), "name".into()),
            ("_order".into(), "desc".into()),
            ("school_id".into(), "s1".into()),
        ])
        .expect("parse");
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, Some(20));
        assert_eq!(query.sort, Some(("name".into(), SortOrder::Desc)));
        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.filters[0].0, "school_id");
    }

    #[test]
    fn bad_paging_values_are_rejected() {
        assert!(parse_list_query(vec![("_limit".into(), "ten".into())]).is_err());
        assert!(parse_list_query(vec![("_order".into(), "sideways".into())]).is_err());
    }

    #[test]
    fn user_password_field_is_absorbed_into_hash() {
        let mut body = serde_json::json!({"id": "u1", "password": "pw"});
        absorb_password(collections::USERS, &mut body);
        assert!(body.get("password").is_none());
        let hash = body.get("password_hash").and_then(|v| v.as_str()).unwrap();
        assert!(accounts::verify_password(hash, "pw"));
    }
}
