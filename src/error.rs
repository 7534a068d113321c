use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::ws::frame::OutboundFrame;

/// The error kinds surfaced either as HTTP responses or as Error frames on a live socket.
///
/// `Transport` and `Fatal` never produce an Error frame: both end the session.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Fatal(String),
}

impl AppError {
    /// Never call this with `Transport` or `Fatal` — both tear the session down instead.
    pub fn to_error_frame(&self) -> OutboundFrame {
        OutboundFrame::Error {
            command: "Error".to_string(),
            error: self.to_string(),
        }
    }

    pub fn is_session_fatal(&self) -> bool {
        matches!(self, AppError::Transport(_) | AppError::Fatal(_))
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => AppError::NotFound("not found".to_string()),
            rusqlite::Error::SqliteFailure(e, ref msg)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                AppError::Conflict(msg.clone().unwrap_or_else(|| "conflict".to_string()))
            }
            other => AppError::Fatal(other.to_string()),
        }
    }
}

impl From<crate::bus::BusError> for AppError {
    fn from(err: crate::bus::BusError) -> Self {
        AppError::Transport(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Transport(_) | AppError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}
