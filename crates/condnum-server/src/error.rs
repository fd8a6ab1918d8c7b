//! Server error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use condnum_core::ConditionError;
use serde_json::json;
use thiserror::Error;

/// Errors returned by REST handlers
#[derive(Error, Debug)]
pub enum ServerError {
    /// Malformed request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Referenced condition does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate condition under an active create-lock
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage or other internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            ServerError::InvalidRequest(msg)
            | ServerError::NotFound(msg)
            | ServerError::Conflict(msg)
            | ServerError::Internal(msg) => msg,
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

impl From<ConditionError> for ServerError {
    fn from(err: ConditionError) -> Self {
        match err {
            ConditionError::Internal(_) => ServerError::Internal(err.to_string()),
            ConditionError::Conflict(_) => ServerError::Conflict(err.to_string()),
            ConditionError::NotFound(_) => ServerError::NotFound(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_error_mapping() {
        let cases = [
            (ConditionError::internal("db down"), StatusCode::INTERNAL_SERVER_ERROR),
            (ConditionError::conflict("k"), StatusCode::CONFLICT),
            (ConditionError::not_found("42"), StatusCode::NOT_FOUND),
        ];
        for (err, status) in cases {
            let server_err: ServerError = err.into();
            assert_eq!(server_err.status(), status);
            assert_eq!(server_err.into_response().status(), status);
        }
    }

    #[test]
    fn test_display_keeps_source_message() {
        let err: ServerError = ConditionError::conflict("salary Gt 3").into();
        assert_eq!(err.to_string(), "Conflict: already exists: salary Gt 3");
    }

    #[test]
    fn test_into_response_invalid_request() {
        let response = ServerError::InvalidRequest("bad input".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ServerError>();
    }
}
