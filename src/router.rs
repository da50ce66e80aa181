use crate::db::DocumentStore;
use crate::handlers;
use axum::{
    Router,
    routing::{get, post},
};

#[derive(Clone)]
pub struct AppState {
    pub store: DocumentStore,
    pub session_ttl_hours: i64,
}

impl AppState {
    pub fn new(store: DocumentStore, session_ttl_hours: i64) -> Self {
        Self {
            store,
            session_ttl_hours,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/change-password", post(handlers::auth::change_password))
        .route(
            "/api/{collection}",
            get(handlers::crud::list).post(handlers::crud::insert),
        )
        .route(
            "/api/{collection}/{id}",
            get(handlers::crud::fetch)
                .put(handlers::crud::update)
                .delete(handlers::crud::remove),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
