//! # Error Handling
//!
//! Two error families live here:
//!
//! - **AppError**: failures on the HTTP surface (webhook, WebSocket upgrade),
//!   converted to JSON error responses through actix's `ResponseError`.
//! - **SessionError**: failures inside one call's media stream. These never
//!   leave the connection actor; they are classified so that an expected
//!   hang-up can be told apart from a genuine fault in the logs.
//!
//! ## Propagation Policy:
//! One call's failure never reaches the HTTP server, the process, or any other
//! call. Nothing is retried: a session that ends is over for good.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Errors returned by HTTP handlers.
///
/// ## Error Categories:
/// - **BadRequest**: The caller sent something we cannot serve (400 errors)
/// - **ConfigError**: Configuration problems discovered at request time (500 errors)
#[derive(Debug)]
pub enum AppError {
    /// Client sent an invalid request (for example a non-WebSocket GET on the media stream path)
    BadRequest(String),

    /// Configuration file or environment variable problems
    ConfigError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

/// Converts errors into JSON HTTP responses.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "bad_request",
///     "message": "WebSocket handshake failed: ...",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
            AppError::ConfigError(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Why a call's media stream stopped processing a frame, or stopped altogether.
///
/// ## Classification:
/// | Variant | Expected? | Ends the session? |
/// |---|---|---|
/// | `Disconnected` | yes | yes |
/// | `MalformedFrame` | no | no, the frame is skipped |
/// | `Transport` | no | yes |
/// | `Encode` | no | yes |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The remote party hung up or closed the channel
    Disconnected,

    /// An inbound frame could not be understood
    MalformedFrame(String),

    /// The WebSocket transport reported a protocol failure
    Transport(String),

    /// An outbound frame could not be produced
    Encode(String),
}

impl SessionError {
    /// Whether the session must end because of this error.
    pub fn ends_session(&self) -> bool {
        !matches!(self, SessionError::MalformedFrame(_))
    }

    /// Whether this is a normal part of a call's life rather than a fault.
    pub fn is_expected(&self) -> bool {
        matches!(self, SessionError::Disconnected)
    }

    /// Short machine-readable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Disconnected => "disconnected",
            SessionError::MalformedFrame(_) => "malformed_frame",
            SessionError::Transport(_) => "transport",
            SessionError::Encode(_) => "encode",
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Disconnected => write!(f, "Channel closed by remote party"),
            SessionError::MalformedFrame(msg) => write!(f, "Malformed frame: {}", msg),
            SessionError::Transport(msg) => write!(f, "Transport error: {}", msg),
            SessionError::Encode(msg) => write!(f, "Encode error: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_classification() {
        assert!(SessionError::Disconnected.is_expected());
        assert!(SessionError::Disconnected.ends_session());

        let malformed = SessionError::MalformedFrame("eof".to_string());
        assert!(!malformed.is_expected());
        assert!(!malformed.ends_session());

        for err in [
            SessionError::Transport("reset".to_string()),
            SessionError::Encode("bad".to_string()),
        ] {
            assert!(!err.is_expected());
            assert!(err.ends_session());
        }
    }

    #[test]
    fn test_app_error_status_codes() {
        let response = AppError::BadRequest("nope".to_string()).error_response();
        assert_eq!(response.status(), actix_web::http::StatusCode::BAD_REQUEST);

        let response = AppError::ConfigError("missing".to_string()).error_response();
        assert_eq!(response.status(), actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
