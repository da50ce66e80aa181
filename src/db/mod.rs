//! Database module: models, schema, and the document store.
//!
//! Layout:
//! - `models.rs`: typed structs for the registered collections
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `store.rs`: the pass-through CRUD wrapper over the documents table

pub mod models;
pub mod schema;
pub mod store;

pub use schema::SQLITE_INIT;
pub use store::{DocumentStore, FilterValue, ListQuery, SortOrder, SqlitePool};

use crate::error::AppError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

/// Open (creating if missing) the SQLite database and initialize the schema.
pub async fn spawn(database_url: &str) -> Result<DocumentStore, AppError> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;
    let store = DocumentStore::new(pool);
    store.init_schema().await?;
    Ok(store)
}
