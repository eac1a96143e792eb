//! User-facing error taxonomy.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewerError {
    /// Rejected before any request is sent (type, size, missing file).
    #[error("{message}")]
    InputValidation { message: String, status: StatusCode },

    /// Non-success status, network failure or undecodable body.
    #[error("Recognition request failed: {0}")]
    Transport(String),

    /// `error` field in an otherwise successful response.
    #[error("{0}")]
    Service(String),

    /// Engine reported a non-zero internal code.
    #[error("OCR error: unsupported image type")]
    Engine(i64),

    #[error("A recognition request is already in progress")]
    Busy,

    #[error("No recognition result is loaded")]
    NoResult,

    #[error("Zoom unavailable: {0}")]
    Zoom(String),

    #[error("Timed out waiting for the zoom view to render")]
    ZoomTimeout,

    #[error("Page rendering failed: {0}")]
    Render(String),
}

/// Coarse category shown to the user and returned to API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputValidation,
    Transport,
    Service,
    Engine,
    Busy,
    NoResult,
    Zoom,
    Internal,
}

impl ViewerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InputValidation {
            message: message.into(),
            status: StatusCode::BAD_REQUEST,
        }
    }

    pub fn too_large(message: impl Into<String>) -> Self {
        Self::InputValidation {
            message: message.into(),
            status: StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InputValidation { .. } => ErrorKind::InputValidation,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Service(_) => ErrorKind::Service,
            Self::Engine(_) => ErrorKind::Engine,
            Self::Busy => ErrorKind::Busy,
            Self::NoResult => ErrorKind::NoResult,
            Self::Zoom(_) | Self::ZoomTimeout => ErrorKind::Zoom,
            Self::Render(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InputValidation { status, .. } => *status,
            Self::Transport(_) | Self::Service(_) => StatusCode::BAD_GATEWAY,
            Self::Engine(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Busy | Self::Zoom(_) => StatusCode::CONFLICT,
            Self::NoResult => StatusCode::NOT_FOUND,
            Self::ZoomTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: ErrorKind,
}

impl IntoResponse for ViewerError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<reqwest::Error> for ViewerError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<tera::Error> for ViewerError {
    fn from(e: tera::Error) -> Self {
        Self::Render(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ViewerError::invalid("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ViewerError::too_large("x").status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(ViewerError::Engine(3).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ViewerError::Service("boom".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ViewerError::Busy.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_engine_message() {
        assert_eq!(
            ViewerError::Engine(17).to_string(),
            "OCR error: unsupported image type"
        );
        assert_eq!(ViewerError::Engine(17).kind(), ErrorKind::Engine);
    }
}
