//! HTTP error mapping.

use amora_storage::StorageError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use tracing::error;

/// Error codes returned in the `error.code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BadRequest,
    NotFound,
    /// Storage could not be reached; the request may be retried.
    Unavailable,
    InternalError,
}

impl ErrorCode {
    #[must_use]
    pub const fn status_code(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: ErrorCode,
    message: Cow<'static, str>,
}

#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    message: Cow<'static, str>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody { error: ErrorDetail { code: self.code, message: self.message } };
        (self.code.status_code(), Json(body)).into_response()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::InvalidName { .. } => Self::bad_request(err.to_string()),
            StorageError::Unavailable { .. } => {
                error!(error = %err, "Storage unavailable");
                Self::new(ErrorCode::Unavailable, "Storage is temporarily unavailable")
            },
            StorageError::PathTraversalAttempt { .. } | StorageError::Internal { .. } => {
                error!(error = %err, "Storage fault");
                Self::new(ErrorCode::InternalError, "An internal error occurred")
            },
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        Self::bad_request(format!("Invalid multipart data: {}", err.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn storage_errors_map_to_statuses() {
        let invalid: ApiError =
            StorageError::InvalidName { message: "../x".into(), context: None }.into();
        assert_eq!(invalid.code().status_code(), StatusCode::BAD_REQUEST);

        let down: ApiError = StorageError::from(io::Error::from(io::ErrorKind::PermissionDenied)).into();
        assert_eq!(down.code().status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let fault: ApiError = StorageError::Internal { message: "join".into(), context: None }.into();
        assert_eq!(fault.code(), ErrorCode::InternalError);
    }
}
