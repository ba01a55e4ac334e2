use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;

/// Failures surfaced to callers of the proxy routes.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0} parameter is required")]
    MissingParameter(&'static str),

    #[error("{0}")]
    InvalidParameter(String),

    #[error("{upstream} request timed out")]
    UpstreamTimeout { upstream: &'static str },

    /// Upstream answered with a non-2xx status.
    #[error("{upstream} responded with {status}")]
    UpstreamStatus {
        upstream: &'static str,
        status: StatusCode,
        body: Option<Value>,
    },

    /// Network failure or a payload we could not read.
    #[error("{upstream} request failed: {message}")]
    UpstreamFailed {
        upstream: &'static str,
        message: String,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingParameter(_) | ProxyError::InvalidParameter(_) => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::UpstreamTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
            ProxyError::UpstreamStatus { status, .. } => *status,
            ProxyError::UpstreamFailed { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ProxyError::MissingParameter(_) | ProxyError::InvalidParameter(_) => {
                json!({ "error": self.to_string() })
            }
            ProxyError::UpstreamTimeout { .. } => json!({ "error": "Request timeout" }),
            ProxyError::UpstreamStatus {
                body: Some(Value::Object(map)),
                ..
            } => Value::Object(map),
            ProxyError::UpstreamStatus {
                body: Some(Value::String(text)),
                ..
            } => json!({ "error": text, "status": status.as_u16() }),
            ProxyError::UpstreamStatus {
                body: Some(other), ..
            } => json!({ "error": other, "status": status.as_u16() }),
            ProxyError::UpstreamStatus { body: None, .. }
            | ProxyError::UpstreamFailed { .. }
            | ProxyError::Internal(_) => {
                json!({ "error": self.to_string(), "status": status.as_u16() })
            }
        };

        (status, Json(body)).into_response()
    }
}
