use http::StatusCode;

use crate::routing::cors::apply_cors_headers;

/// Error type shared by every request path.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },
    #[error("Upstream transport error: {0}")]
    Transport(String),
    #[error("Upstream timed out: {0}")]
    Timeout(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Request body too large (max {0} bytes)")]
    PayloadTooLarge(usize),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Error declared by upstream inside an otherwise successful response body.
    #[must_use]
    pub fn upstream_event(message: impl Into<String>) -> Self {
        RelayError::Upstream {
            status: StatusCode::BAD_GATEWAY.as_u16(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            RelayError::Forbidden(_) => StatusCode::FORBIDDEN,
            RelayError::Upstream { status, .. } => upstream_status(*status),
            RelayError::Transport(_) | RelayError::Timeout(_) => StatusCode::BAD_GATEWAY,
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
            RelayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::Unauthorized(_) => "unauthorized",
            RelayError::Forbidden(_) => "forbidden",
            RelayError::Upstream { .. } | RelayError::Transport(_) | RelayError::Timeout(_) => {
                "upstream_error"
            }
            RelayError::NotFound(_) => "not_found",
            RelayError::MethodNotAllowed => "method_not_allowed",
            RelayError::PayloadTooLarge(_) => "payload_too_large",
            RelayError::Internal(_) => "internal_error",
        }
    }
}

/// Upstream statuses pass through when they are client or server errors;
/// anything else (including a 2xx carrying an error event) becomes 502.
fn upstream_status(status: u16) -> StatusCode {
    match StatusCode::from_u16(status) {
        Ok(code) if code.is_client_error() || code.is_server_error() => code,
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// Build the `{ "error": { message, type, code } }` body for an error.
#[must_use]
pub fn error_payload(err: &RelayError) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "message": err.to_string(),
            "type": "api_error",
            "code": err.code(),
        }
    })
}

/// Format an error as `(status, JSON body)`.
#[must_use]
pub fn format_error(err: &RelayError) -> (StatusCode, serde_json::Value) {
    (err.status(), error_payload(err))
}

impl axum::response::IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = format_error(&self);
        let mut response = (status, axum::Json(body)).into_response();
        apply_cors_headers(response.headers_mut());
        response
    }
}
