//! Error types for I3X client operations

use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for I3X client operations
pub type Result<T> = std::result::Result<T, I3xError>;

/// Errors that can occur during I3X client operations
#[derive(Error, Debug, Clone)]
pub enum I3xError {
    /// A request was issued before the connection was opened
    #[error("Not connected: call connect() first")]
    NotConnected,

    /// Server unreachable or connection refused
    #[error("Connection failed: {0}")]
    ConnectionFailure(String),

    /// Request deadline exceeded
    #[error("Request timed out: {0}")]
    RequestTimeout(String),

    /// Credentials were rejected (401/403)
    #[error("Authentication failed ({status}): {message}")]
    AuthenticationFailure { status: u16, message: String },

    /// Requested resource does not exist (404)
    #[error("Not found ({status}): {message}")]
    NotFound { status: u16, message: String },

    /// Server returned a 5xx status
    #[error("Server error ({status}): {message}")]
    ServerFailure { status: u16, message: String },

    /// Any other failed request, with the status when one was received
    #[error("Request failed{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    RequestFailure {
        status: Option<u16>,
        message: String,
    },

    /// Subscription stream could not be opened or broke while reading
    #[error("Stream error: {0}")]
    StreamFailure(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Response body did not have the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Fieldless discriminant of [`I3xError`], handy for matching in callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotConnected,
    ConnectionFailure,
    RequestTimeout,
    AuthenticationFailure,
    NotFound,
    ServerFailure,
    RequestFailure,
    StreamFailure,
    InvalidUrl,
    Decode,
    Config,
}

impl I3xError {
    /// Create a not-found error that did not come from an HTTP response
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            status: StatusCode::NOT_FOUND.as_u16(),
            message: message.into(),
        }
    }

    pub fn stream(message: impl Into<String>) -> Self {
        Self::StreamFailure(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotConnected => ErrorKind::NotConnected,
            Self::ConnectionFailure(_) => ErrorKind::ConnectionFailure,
            Self::RequestTimeout(_) => ErrorKind::RequestTimeout,
            Self::AuthenticationFailure { .. } => ErrorKind::AuthenticationFailure,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ServerFailure { .. } => ErrorKind::ServerFailure,
            Self::RequestFailure { .. } => ErrorKind::RequestFailure,
            Self::StreamFailure(_) => ErrorKind::StreamFailure,
            Self::InvalidUrl(_) => ErrorKind::InvalidUrl,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// HTTP status code carried by the error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::AuthenticationFailure { status, .. }
            | Self::NotFound { status, .. }
            | Self::ServerFailure { status, .. } => Some(*status),
            Self::RequestFailure { status, .. } => *status,
            _ => None,
        }
    }
}

/// Map a non-success HTTP status to its typed error
pub fn error_for_status(status: StatusCode, message: impl Into<String>) -> I3xError {
    let message = message.into();
    let code = status.as_u16();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => I3xError::AuthenticationFailure {
            status: code,
            message,
        },
        StatusCode::NOT_FOUND => I3xError::NotFound {
            status: code,
            message,
        },
        s if s.is_server_error() => I3xError::ServerFailure {
            status: code,
            message,
        },
        _ => I3xError::RequestFailure {
            status: Some(code),
            message,
        },
    }
}

/// Pull a human-readable message out of an error response body.
///
/// Prefers a JSON `detail` field, then `message`, and falls back to the raw text.
pub fn extract_error_message(body: &str) -> String {
    let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body)
    else {
        return body.to_string();
    };

    match map.get("detail").or_else(|| map.get("message")) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => body.to_string(),
    }
}

impl From<reqwest::Error> for I3xError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::RequestTimeout(err.to_string())
        } else if err.is_connect() {
            Self::ConnectionFailure(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::RequestFailure {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}

impl From<url::ParseError> for I3xError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for I3xError {
    fn from(err: std::io::Error) -> Self {
        Self::ConnectionFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(401, ErrorKind::AuthenticationFailure)]
    #[case(403, ErrorKind::AuthenticationFailure)]
    #[case(404, ErrorKind::NotFound)]
    #[case(500, ErrorKind::ServerFailure)]
    #[case(503, ErrorKind::ServerFailure)]
    #[case(599, ErrorKind::ServerFailure)]
    #[case(400, ErrorKind::RequestFailure)]
    #[case(409, ErrorKind::RequestFailure)]
    #[case(422, ErrorKind::RequestFailure)]
    fn test_status_mapping(#[case] code: u16, #[case] expected: ErrorKind) {
        let status = StatusCode::from_u16(code).unwrap();
        let err = error_for_status(status, "boom");
        assert_eq!(err.kind(), expected);
        assert_eq!(err.status_code(), Some(code));
    }

    #[test]
    fn test_message_from_detail() {
        assert_eq!(extract_error_message(r#"{"detail": "bad key"}"#), "bad key");
    }

    #[test]
    fn test_message_from_message_field() {
        assert_eq!(
            extract_error_message(r#"{"message": "no such object"}"#),
            "no such object"
        );
    }

    #[test]
    fn test_detail_wins_over_message() {
        assert_eq!(
            extract_error_message(r#"{"message": "m", "detail": "d"}"#),
            "d"
        );
    }

    #[test]
    fn test_structured_detail_is_stringified() {
        assert_eq!(
            extract_error_message(r#"{"detail": [{"loc": "body"}]}"#),
            r#"[{"loc":"body"}]"#
        );
    }

    #[test]
    fn test_message_falls_back_to_raw_text() {
        assert_eq!(extract_error_message("Bad Gateway"), "Bad Gateway");
        assert_eq!(extract_error_message(r#"{"error": "x"}"#), r#"{"error": "x"}"#);
        assert_eq!(extract_error_message("[1, 2]"), "[1, 2]");
    }

    #[test]
    fn test_display_includes_status() {
        let err = error_for_status(StatusCode::IM_A_TEAPOT, "short and stout");
        assert_eq!(err.to_string(), "Request failed (418): short and stout");

        let err = I3xError::RequestFailure {
            status: None,
            message: "reset".into(),
        };
        assert_eq!(err.to_string(), "Request failed: reset");
    }
}
