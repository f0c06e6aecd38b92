//! App-wide error type and its Axum HTTP mapping.
//!
//! Mirrors the reference server's `AppError`/`ErrorBody`/`ErrorDetail`
//! trio: every error response is `{ "error": { "code": ..., "message": ... } }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug)]
pub enum RagError {
    BadRequest(String),
    Timeout(String),
    CircuitOpen(String),
    Internal(String),
}

impl std::fmt::Display for RagError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RagError::BadRequest(m) => write!(f, "bad request: {m}"),
            RagError::Timeout(m) => write!(f, "timeout: {m}"),
            RagError::CircuitOpen(m) => write!(f, "circuit open: {m}"),
            RagError::Internal(m) => write!(f, "internal error: {m}"),
        }
    }
}

impl std::error::Error for RagError {}

impl From<anyhow::Error> for RagError {
    fn from(e: anyhow::Error) -> Self {
        RagError::Internal(e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl RagError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            RagError::BadRequest(m) => (StatusCode::BAD_REQUEST, "bad_request", m.clone()),
            RagError::Timeout(m) => (StatusCode::REQUEST_TIMEOUT, "timeout", m.clone()),
            RagError::CircuitOpen(m) => (StatusCode::INTERNAL_SERVER_ERROR, "circuit_open", m.clone()),
            RagError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", m.clone()),
        }
    }
}

impl IntoResponse for RagError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(RagError::BadRequest("x".into()).parts().0, StatusCode::BAD_REQUEST);
        assert_eq!(RagError::Timeout("x".into()).parts().0, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(
            RagError::CircuitOpen("x".into()).parts().0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
