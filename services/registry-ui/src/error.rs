//! Errors returned by the HTTP API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// An error response. Every variant renders as `{"detail": "<message>"}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The requested repository, tag or route does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The registry answered with a status that is passed through unchanged.
    #[error("{detail}")]
    Upstream {
        /// Status the registry answered with.
        status: StatusCode,
        /// Message for the caller.
        detail: String,
    },

    /// The registry could not be reached or answered unexpectedly.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream { status, .. } => *status,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<registry_client::RegistryClientError> for ApiError {
    fn from(error: registry_client::RegistryClientError) -> Self {
        ApiError::Internal(error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(%status, error = %self, "request failed");
        } else {
            tracing::debug!(%status, error = %self, "request failed");
        }

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt as _;

    use super::*;

    #[tokio::test]
    async fn renders_detail_body() {
        let response = ApiError::Upstream {
            status: StatusCode::METHOD_NOT_ALLOWED,
            detail: "Failed to delete image: disabled".into(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({"detail": "Failed to delete image: disabled"}));
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            ApiError::NotFound("Tag not found: v1".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
