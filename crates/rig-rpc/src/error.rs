//! Error types for the RPC core.
//!
//! Every error here is local to one message or one connection; none of them is
//! allowed to take down the hosting process.

use crate::protocol::status;
use crate::transport::TransportError;
use thiserror::Error;

/// An envelope or payload could not be decoded.
///
/// `id` is set when the envelope got far enough to identify its request, in
/// which case the request can still be answered with a client-error response.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DecodeError {
    pub id: Option<String>,
    pub message: String,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            id: None,
            message: message.into(),
        }
    }

    /// Attach the id of the request this error belongs to.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl From<postcard::Error> for DecodeError {
    fn from(err: postcard::Error) -> Self {
        DecodeError::new(err.to_string())
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::new(err.to_string())
    }
}

/// A value could not be encoded.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("binary encoding failed: {0}")]
    Binary(#[from] postcard::Error),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not valid UTF-8 JSON")]
    InvalidJsonPayload,
}

/// Main error type for the RPC core.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The scope already sent its terminal response, or never had a response
    /// path (notifications).
    #[error("response not supported")]
    ResponseNotSupported,

    #[error("function {function:?} is not a streaming request")]
    NotStreaming { function: String },

    #[error("method not found")]
    MethodNotFound,

    #[error("function {0:?} not found")]
    FunctionNotFound(String),

    #[error("{0} while decoding input")]
    Decode(#[from] DecodeError),

    #[error("{0} while encoding response")]
    Encode(#[from] EncodeError),

    #[error("frame of {size} bytes exceeds read limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("connection closed")]
    ConnectionClosed,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result type alias for RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;

impl RpcError {
    /// Failure-response code for this error.
    ///
    /// - 404: unknown kind or function
    /// - 406: input could not be decoded
    /// - 500: everything else
    pub fn status_code(&self) -> i32 {
        match self {
            RpcError::MethodNotFound | RpcError::FunctionNotFound(_) => status::NOT_FOUND,
            RpcError::Decode(_) => status::BAD_INPUT,
            _ => status::INTERNAL,
        }
    }

    /// Whether the error is fatal to the connection rather than to one message.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            RpcError::Transport(_) | RpcError::ConnectionClosed | RpcError::FrameTooLarge { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RpcError::FunctionNotFound("nope".into());
        assert_eq!(err.to_string(), r#"function "nope" not found"#);
        assert_eq!(RpcError::ResponseNotSupported.to_string(), "response not supported");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(RpcError::MethodNotFound.status_code(), 404);
        assert_eq!(RpcError::Decode(DecodeError::new("eof")).status_code(), 406);
        assert_eq!(RpcError::ConnectionClosed.status_code(), 500);
    }

    #[test]
    fn test_decode_error_keeps_id() {
        let err = DecodeError::new("truncated").with_id("42");
        assert_eq!(err.id.as_deref(), Some("42"));
        assert_eq!(
            RpcError::from(err).to_string(),
            "truncated while decoding input"
        );
    }

    #[test]
    fn test_connection_fatal() {
        assert!(RpcError::Transport(TransportError::Closed).is_connection_fatal());
        assert!(RpcError::FrameTooLarge { size: 10, limit: 5 }.is_connection_fatal());
        assert!(!RpcError::ResponseNotSupported.is_connection_fatal());
    }
}
