use crate::error::LexaiError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Error returned by an HTTP handler
///
/// Rendered as `{"detail": "..."}` with a status chosen from the
/// underlying [`LexaiError`].
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let Some(error) = err.downcast_ref::<LexaiError>() else {
            tracing::error!("Unhandled error: {:#}", err);
            return Self::new(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", err));
        };
        match error {
            LexaiError::UnknownVariant(_) => Self::new(StatusCode::BAD_REQUEST, error.to_string()),
            LexaiError::InvalidRequest(detail) => Self::new(StatusCode::BAD_REQUEST, detail.clone()),
            LexaiError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "Conversation not found."),
            LexaiError::Engine(_) => {
                tracing::error!("Engine failure: {}", error);
                Self::new(StatusCode::BAD_GATEWAY, error.to_string())
            }
            LexaiError::Timeout(_) => Self::new(StatusCode::GATEWAY_TIMEOUT, error.to_string()),
            _ => {
                tracing::error!("Request failed: {:#}", err);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}
