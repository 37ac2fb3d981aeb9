use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use resender::ResenderError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Internal(ResenderError),
}

impl From<ResenderError> for ApiError {
    fn from(err: ResenderError) -> Self {
        match err {
            ResenderError::InvalidInput { .. } => Self::BadRequest(err.to_string()),
            err => Self::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message.clone()),
            Self::Internal(err) => {
                tracing::error!(?err, "Request failed: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_owned())
            }
        };
        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}
