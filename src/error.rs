use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;
use tracing::error;

#[derive(Debug, ThisError)]
pub enum AppError {
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("missing or invalid session token")]
    Unauthenticated,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] SqlxError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            AppError::UnknownCollection(name) => (
                StatusCode::NOT_FOUND,
                ApiErrorBody {
                    code: "UNKNOWN_COLLECTION".to_string(),
                    message: format!("no such collection: {name}"),
                },
            ),
            AppError::NotFound { collection, id } => (
                StatusCode::NOT_FOUND,
                ApiErrorBody {
                    code: "NOT_FOUND".to_string(),
                    message: format!("no document {id} in {collection}"),
                },
            ),
            AppError::InvalidDocument(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "INVALID_DOCUMENT".to_string(),
                    message: msg,
                },
            ),
            AppError::InvalidQuery(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "INVALID_QUERY".to_string(),
                    message: msg,
                },
            ),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                ApiErrorBody {
                    code: "INVALID_CREDENTIALS".to_string(),
                    message: "username or password is incorrect".to_string(),
                },
            ),
            AppError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                ApiErrorBody {
                    code: "UNAUTHENTICATED".to_string(),
                    message: "a valid session token is required".to_string(),
                },
            ),
            AppError::Json(e) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "BAD_JSON".to_string(),
                    message: e.to_string(),
                },
            ),
            AppError::Database(e) => {
                // Storage detail stays in the log, not in the response.
                error!(error = %e, "database operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorBody {
                        code: "INTERNAL_ERROR".to_string(),
                        message: "an internal server error occurred".to_string(),
                    },
                )
            }
        };
        (status, Json(ApiErrorResponse { error: body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}
