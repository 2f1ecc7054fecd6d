use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
///
/// Cloneable so a single shared computation can hand its outcome to every waiter.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Model snapshot changed during computation (served {served}, current {current})")]
    StaleModel { served: u64, current: u64 },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::StaleModel { .. } => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::Store(_) | AppError::Serialization(_) | AppError::Internal(_) => {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (AppError::NotFound("movie 7".into()), StatusCode::NOT_FOUND),
            (AppError::Validation("missing user_id".into()), StatusCode::BAD_REQUEST),
            (
                AppError::StaleModel {
                    served: 1,
                    current: 3,
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (AppError::Store("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_serde_error_conversion() {
        let err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let app_err: AppError = err.into();
        assert!(matches!(app_err, AppError::Serialization(_)));
    }
}
