use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::completion::InitError;
use crate::folders::FolderError;
use crate::literature::LocateError;
use crate::openai::CompletionError;
use crate::render::RenderError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Handler failures; every variant renders as `{"error": message}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "request rejected");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(format!("invalid query string: {}", rejection.body_text()))
    }
}

impl From<FolderError> for ApiError {
    fn from(err: FolderError) -> Self {
        match err {
            FolderError::NotADirectory(_) => ApiError::BadRequest(err.to_string()),
            FolderError::PermissionDenied(_) => ApiError::Forbidden(err.to_string()),
            FolderError::Io { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<LocateError> for ApiError {
    fn from(err: LocateError) -> Self {
        match err {
            LocateError::NotFound(_) => ApiError::NotFound(err.to_string()),
            LocateError::Io { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<InitError> for ApiError {
    fn from(err: InitError) -> Self {
        ApiError::Internal(format!("completion client unavailable: {err}"))
    }
}

impl From<CompletionError> for ApiError {
    fn from(err: CompletionError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        ApiError::Internal(format!("render document: {err}"))
    }
}
