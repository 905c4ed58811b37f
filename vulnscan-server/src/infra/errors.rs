use std::fmt;

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use vulnscan_core::ScanError;
use vulnscan_model::ErrorBody;

pub type AppResult<T> = Result<T, AppError>;

/// Error response; always rendered as `{"status":"error","detail":...}`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody::new(self.message))).into_response()
    }
}

impl From<ScanError> for AppError {
    fn from(err: ScanError) -> Self {
        if err.is_invalid_input() {
            return Self::bad_request(err.to_string());
        }
        match err {
            ScanError::NotFound(_) => Self::not_found(err.to_string()),
            ScanError::Database(ref source) => {
                tracing::error!(error = ?source, "database operation failed");
                Self::internal(err.to_string())
            }
            _ => Self::internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use vulnscan_model::{ModelError, ScanId};

    use super::*;

    #[test]
    fn invalid_image_maps_to_bad_request() {
        let err = AppError::from(ScanError::Model(
            ModelError::InvalidImageReference("empty".into()),
        ));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_scan_maps_to_not_found() {
        let err = AppError::from(ScanError::NotFound(ScanId(9)));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.message, "scan 9 not found");
    }

    #[test]
    fn everything_else_is_internal() {
        let err = AppError::from(ScanError::Internal("boom".into()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
