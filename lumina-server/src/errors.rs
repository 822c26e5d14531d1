use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

use lumina_core::CoreError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub retryable: bool,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
                "retryable": self.retryable,
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match &err {
            CoreError::Validation(msg) => Self::bad_request(msg.clone()),
            CoreError::NotFound(msg) => Self::not_found(msg.clone()),
            CoreError::TransientStore(msg) | CoreError::TransientBroker(msg) => {
                Self {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    message: msg.clone(),
                    retryable: true,
                }
            }
            _ => Self::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        let cases = [
            (CoreError::Validation("v".into()), StatusCode::BAD_REQUEST, false),
            (CoreError::NotFound("n".into()), StatusCode::NOT_FOUND, false),
            (
                CoreError::TransientStore("s".into()),
                StatusCode::SERVICE_UNAVAILABLE,
                true,
            ),
            (
                CoreError::TransientBroker("b".into()),
                StatusCode::SERVICE_UNAVAILABLE,
                true,
            ),
            (
                CoreError::Internal("i".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
            ),
        ];
        for (err, status, retryable) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status, status);
            assert_eq!(api.retryable, retryable);
        }
    }
}
