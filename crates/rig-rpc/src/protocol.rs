//! Envelope model shared by every wire encoding.
//!
//! A [`Request`] is what a client sends; a [`Response`] is anything the server
//! sends back over the same connection, including out-of-band notifications and
//! server-initiated calls. Payloads stay as opaque, still-encoded bytes until a
//! handler decodes them into its declared input type.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Conventional failure codes, analogous to HTTP status codes.
pub mod status {
    /// The requested method or function does not exist.
    pub const NOT_FOUND: i32 = 404;
    /// The request input could not be decoded.
    pub const BAD_INPUT: i32 = 406;
    /// The handler failed.
    pub const INTERNAL: i32 = 500;
}

/// What a request expects in return, and therefore which handler table serves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// Exactly one terminal response is expected.
    Call,
    /// Zero or more streaming items followed by one terminal response.
    Start,
    /// Fire-and-forget; no id, no response.
    Notify,
    /// A kind this server does not understand.
    Other(String),
}

impl RequestKind {
    pub fn as_str(&self) -> &str {
        match self {
            RequestKind::Call => "call",
            RequestKind::Start => "start",
            RequestKind::Notify => "notify",
            RequestKind::Other(kind) => kind,
        }
    }

    /// Whether this kind is allowed to emit streaming items.
    pub fn is_streaming(&self) -> bool {
        matches!(self, RequestKind::Start)
    }
}

impl From<&str> for RequestKind {
    fn from(kind: &str) -> Self {
        match kind {
            "call" => RequestKind::Call,
            "start" => RequestKind::Start,
            "notify" => RequestKind::Notify,
            other => RequestKind::Other(other.to_string()),
        }
    }
}

impl std::str::FromStr for RequestKind {
    type Err = std::convert::Infallible;

    /// Unknown kinds parse as [`RequestKind::Other`].
    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        Ok(RequestKind::from(kind))
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One client-initiated operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Correlates responses; empty for notifications.
    pub id: String,
    pub kind: RequestKind,
    /// Name selecting a handler.
    pub function: String,
    /// Encoded input, decoded lazily by the handler.
    pub input: Option<Bytes>,
}

impl Request {
    pub fn new(
        id: impl Into<String>,
        kind: RequestKind,
        function: impl Into<String>,
        input: Option<Bytes>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            function: function.into(),
            input,
        }
    }

    /// Whether responses can be correlated with this request.
    pub fn expects_response(&self) -> bool {
        !self.id.is_empty()
    }
}

/// Detail carried by a failure-terminal response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fail {
    /// Status code, generally analogous to HTTP status codes.
    pub code: i32,
    pub msg: String,
}

impl Fail {
    pub fn new(code: i32, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
        }
    }
}

/// What a response says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// Success-terminal.
    Succ(Option<Bytes>),
    /// Failure-terminal.
    Fail(Fail),
    /// Streaming item; never terminal.
    Yield(Option<Bytes>),
    /// Stream-end terminal, no payload.
    End,
    /// Out-of-band message to the client; carries no id.
    Notify {
        function: String,
        params: Option<Bytes>,
    },
    /// Server-initiated call to the client.
    Call {
        function: String,
        params: Option<Bytes>,
    },
}

impl ResponseBody {
    /// The method marker used by the binary encoding.
    pub fn method(&self) -> &'static str {
        match self {
            ResponseBody::Succ(_) => "succ",
            ResponseBody::Fail(_) => "fail",
            ResponseBody::Yield(_) => "yield",
            ResponseBody::End => "end",
            ResponseBody::Notify { .. } => "notify",
            ResponseBody::Call { .. } => "call",
        }
    }

    /// Whether this response ends the lifecycle of its request.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResponseBody::Succ(_) | ResponseBody::Fail(_) | ResponseBody::End
        )
    }
}

/// A message sent from the server to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Id of the originating request; empty for notifications.
    pub id: String,
    pub body: ResponseBody,
}

impl Response {
    pub fn new(id: impl Into<String>, body: ResponseBody) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }

    pub fn fail(id: impl Into<String>, code: i32, msg: impl Into<String>) -> Self {
        Self::new(id, ResponseBody::Fail(Fail::new(code, msg)))
    }
}
