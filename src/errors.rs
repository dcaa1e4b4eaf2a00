use crate::services::bucket::StorageError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

/// A request failure carried to the client as a plain-text body.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// 404 for a key that does not exist.
    pub fn not_found(key: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("object {} is not found", key))
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "Forbidden")
    }

    pub fn unsupported_method() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Unsupported method")
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
        (self.status, self.message).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::InvalidObjectKey(_) => {
                AppError::new(StatusCode::BAD_REQUEST, err.to_string())
            }
            StorageError::RangeNotSatisfiable { .. } => {
                AppError::new(StatusCode::RANGE_NOT_SATISFIABLE, err.to_string())
            }
            _ => {
                tracing::error!("backend failure: {}", err);
                AppError::internal("backend failure")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn storage_errors_map_to_status_codes() {
        let err: AppError = StorageError::InvalidObjectKey(String::new()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err: AppError = StorageError::RangeNotSatisfiable {
            key: "k".into(),
            range: "bytes=9-".into(),
            size: 3,
        }
        .into();
        assert_eq!(err.status, StatusCode::RANGE_NOT_SATISFIABLE);

        let err: AppError = StorageError::Io(io::Error::other("boom")).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "backend failure");
    }

    #[test]
    fn not_found_names_the_key() {
        let err = AppError::not_found("a/b.txt");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "object a/b.txt is not found");
    }
}
