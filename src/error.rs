use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::models::{ItemId, Strategy};

/// Failures raised while building or querying a feature space
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("No usable records for attribute '{attribute}'")]
    EmptyCorpus { attribute: String },

    #[error("Item {item_id} has a vector of length {found}, expected {expected}")]
    DimensionMismatch {
        item_id: ItemId,
        expected: usize,
        found: usize,
    },

    #[error("Item {item_id} is not part of the {strategy} feature space")]
    NotFound { item_id: ItemId, strategy: Strategy },
}

/// A stored recommendation list that is shorter than the caller asked for.
///
/// Not an error: the dispatcher logs it and still serves the shorter list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleCacheWarning {
    pub item_id: ItemId,
    pub strategy: Strategy,
    pub stored: usize,
    pub requested: usize,
}

impl std::fmt::Display for StaleCacheWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "stale {} entry for item {}: {} stored, {} requested",
            self.strategy, self.item_id, self.stored, self.requested
        )
    }
}

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Engine(EngineError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            AppError::Engine(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::Database(_) | AppError::Cache(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
