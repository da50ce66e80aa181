use crate::db::models::DbSession;
use crate::db::schema::SQLITE_INIT;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Pool, QueryBuilder, Sqlite};

pub type SqlitePool = Pool<Sqlite>;

/// Filter operand bound into a `json_extract` equality comparison.
///
/// Query-string values arrive untyped, and the stored field may be text or
/// numeric: a phone number `"0501234567"` is text, an `active` flag is a
/// JSON boolean (which JSON1 stores as a 0/1 integer). A value that also
/// reads as a number or boolean is therefore matched against both
/// interpretations; the raw text is always kept.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterValue {
    raw: String,
    typed: Option<TypedValue>,
}

#[derive(Debug, Clone, PartialEq)]
enum TypedValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl FilterValue {
    /// Parse a raw query-string value, keeping the original text alongside
    /// any numeric or boolean reading.
    pub fn parse(raw: &str) -> Self {
        let typed = match raw {
            "true" => Some(TypedValue::Bool(true)),
            "false" => Some(TypedValue::Bool(false)),
            _ => raw
                .parse::<i64>()
                .ok()
                .map(TypedValue::Int)
                .or_else(|| raw.parse::<f64>().ok().map(TypedValue::Float)),
        };
        Self {
            raw: raw.to_string(),
            typed,
        }
    }

    /// Exact text comparison with no alternate reading.
    pub fn text(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            typed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Listing parameters for `find`/`count`. Filters are top-level field
/// equality only.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub filters: Vec<(String, FilterValue)>,
    pub sort: Option<(String, SortOrder)>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Field names are interpolated into `json_extract` paths, so they are
/// restricted to identifier characters.
fn ensure_safe_field(field: &str) -> Result<(), AppError> {
    let ok = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(AppError::InvalidQuery(format!(
            "illegal field name: {field:?}"
        )))
    }
}

fn push_filters(
    qb: &mut QueryBuilder<'_, Sqlite>,
    filters: &[(String, FilterValue)],
) -> Result<(), AppError> {
    for (field, value) in filters {
        ensure_safe_field(field)?;
        let path = format!("json_extract(body, '$.{field}')");
        match &value.typed {
            Some(typed) => {
                qb.push(format!(" AND ({path} = "));
                match typed {
                    TypedValue::Bool(b) => qb.push_bind(*b as i64),
                    TypedValue::Int(i) => qb.push_bind(*i),
                    TypedValue::Float(f) => qb.push_bind(*f),
                };
                qb.push(format!(" OR {path} = "));
                qb.push_bind(value.raw.clone());
                qb.push(")");
            }
            None => {
                qb.push(format!(" AND {path} = "));
                qb.push_bind(value.raw.clone());
            }
        }
    }
    Ok(())
}

/// Pass-through CRUD wrapper over the `documents` table. No query planning,
/// no caching; every call is one SQL statement against the shared pool.
#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), AppError> {
        // execute multiple statements safely (SQLite supports multi-commands but sqlx::query doesn't)
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn find(
        &self,
        collection: &str,
        query: &ListQuery,
    ) -> Result<Vec<Value>, AppError> {
        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT body FROM documents WHERE collection = ");
        qb.push_bind(collection.to_string());
        push_filters(&mut qb, &query.filters)?;

        match &query.sort {
            Some((field, order)) => {
                ensure_safe_field(field)?;
                qb.push(format!(
                    " ORDER BY json_extract(body, '$.{field}') {}",
                    order.as_sql()
                ));
            }
            None => {
                qb.push(" ORDER BY created_at, id");
            }
        }

        if query.limit.is_some() || query.offset.is_some() {
            qb.push(" LIMIT ");
            qb.push_bind(query.limit.unwrap_or(-1));
            qb.push(" OFFSET ");
            qb.push_bind(query.offset.unwrap_or(0));
        }

        let rows: Vec<String> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|body| serde_json::from_str(body).map_err(AppError::from))
            .collect()
    }

    /// First match for the given filters, ignoring sort and paging.
    pub async fn find_one(
        &self,
        collection: &str,
        field: &str,
        value: FilterValue,
    ) -> Result<Option<Value>, AppError> {
        let query = ListQuery {
            filters: vec![(field.to_string(), value)],
            limit: Some(1),
            ..Default::default()
        };
        Ok(self.find(collection, &query).await?.into_iter().next())
    }

    pub async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, AppError> {
        let body: Option<String> = sqlx::query_scalar(
            "SELECT body FROM documents WHERE collection = ? AND id = ?",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match body {
            Some(b) => Ok(Some(serde_json::from_str(&b)?)),
            None => Ok(None),
        }
    }

    pub async fn count(&self, collection: &str, query: &ListQuery) -> Result<i64, AppError> {
        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM documents WHERE collection = ");
        qb.push_bind(collection.to_string());
        push_filters(&mut qb, &query.filters)?;
        let n: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(n)
    }

    /// Insert a new document. The body's `id` field must already be set and
    /// must match `id`. Fails when the id is taken.
    pub async fn insert(&self, collection: &str, id: &str, body: &Value) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        let done = sqlx::query(
            r#"INSERT INTO documents (collection, id, body, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(collection, id) DO NOTHING"#,
        )
        .bind(collection)
        .bind(id)
        .bind(body.to_string())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 {
            return Err(AppError::InvalidDocument(format!(
                "document {id} already exists in {collection}"
            )));
        }
        Ok(())
    }

    /// Merge `patch` into the stored body (RFC 7386 semantics via SQLite
    /// `json_patch`): only the targeted fields change, `null` removes a field.
    pub async fn update(&self, collection: &str, id: &str, patch: &Value) -> Result<(), AppError> {
        let done = sqlx::query(
            r#"UPDATE documents
               SET body = json_patch(body, ?), updated_at = ?
               WHERE collection = ? AND id = ?"#,
        )
        .bind(patch.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(collection)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 {
            return Err(AppError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn delete(&self, collection: &str, id: &str) -> Result<(), AppError> {
        let done = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(AppError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Insert when absent, merge into the existing body when present.
    pub async fn upsert(&self, collection: &str, id: &str, body: &Value) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"INSERT INTO documents (collection, id, body, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(collection, id) DO UPDATE SET
                   body = json_patch(documents.body, excluded.body),
                   updated_at = excluded.updated_at"#,
        )
        .bind(collection)
        .bind(id)
        .bind(body.to_string())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- sessions ----

    pub async fn create_session(&self, session: &DbSession) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&session.token)
        .bind(&session.user_id)
        .bind(session.created_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Look up a live session. Expired rows are deleted on sight.
    pub async fn get_session(&self, token: &str) -> Result<Option<DbSession>, AppError> {
        let row: Option<(String, String, String, String)> = sqlx::query_as(
            "SELECT token, user_id, created_at, expires_at FROM sessions WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        let Some((token, user_id, created_at, expires_at)) = row else {
            return Ok(None);
        };
        let created_at = parse_rfc3339(&created_at)?;
        let expires_at = parse_rfc3339(&expires_at)?;

        if expires_at <= Utc::now() {
            self.delete_session(&token).await?;
            return Ok(None);
        }
        Ok(Some(DbSession {
            token,
            user_id,
            created_at,
            expires_at,
        }))
    }

    pub async fn delete_session(&self, token: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Database(sqlx::Error::Decode(Box::new(e))))
}
