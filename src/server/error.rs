//! Backend error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub type ApiResult<T> = Result<T, ApiError>;

/// Errors the backend surfaces to clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // 400
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // 401
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Missing or invalid session token")]
    Unauthorized,

    // 403
    #[error("Admin token required")]
    AdminOnly,

    // 404
    #[error("Expense not found")]
    ExpenseNotFound,

    #[error("Income not found")]
    IncomeNotFound,

    // 409
    #[error("Email already registered")]
    EmailTaken,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::AdminOnly => StatusCode::FORBIDDEN,
            ApiError::ExpenseNotFound | ApiError::IncomeNotFound => StatusCode::NOT_FOUND,
            ApiError::EmailTaken => StatusCode::CONFLICT,
        }
    }
}

/// `{ success: false, error }` — the failure half of the response
/// envelope.
#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
