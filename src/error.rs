use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Wire result codes for the call endpoint.
pub mod codes {
    pub const SUCCESS: &str = "SUCCESS";
    pub const ROOM_FULL: &str = "FULL";
    pub const UNKNOWN_ROOM: &str = "UNKNOWN_ROOM";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const ERROR: &str = "ERROR";
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Room is full")]
    RoomFull,

    #[error("Unknown room: {0}")]
    UnknownRoom(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl AppError {
    /// Result code reported in the response envelope. CAS version
    /// mismatches never reach this point; they are retried inside the
    /// coordinator.
    pub fn result_code(&self) -> &'static str {
        match self {
            AppError::RoomFull => codes::ROOM_FULL,
            AppError::UnknownRoom(_) => codes::UNKNOWN_ROOM,
            AppError::InvalidRequest(_) => codes::INVALID_REQUEST,
            AppError::StoreUnavailable(_) => codes::ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::RoomFull => StatusCode::CONFLICT,
            AppError::UnknownRoom(_) => StatusCode::NOT_FOUND,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "result": self.result_code(),
        }));

        (status, body).into_response()
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::StoreUnavailable(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for AppError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        AppError::StoreUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::StoreUnavailable(format!("stored room is unreadable: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
