//! Centralized configuration for the RPC core.

use crate::error::{Result, RpcError};

/// RPC-level constants.
pub struct RpcConfig;

impl RpcConfig {
    /// No read limit unless one is configured.
    pub const DEFAULT_READ_LIMIT: Option<usize> = None;
    /// Prefix of ids given to server-initiated calls, so they never collide
    /// with client-chosen ids in logs.
    pub const SERVER_CALL_ID_PREFIX: &'static str = "srv-";
    /// Default route of the binary endpoint.
    pub const BINARY_ROUTE: &'static str = "/mrpc";
    /// Default route of the JSON endpoint.
    pub const JSON_ROUTE: &'static str = "/jrpc";
}

/// Per-server settings, fixed once the server is built.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Name used in logs; defaults to the codec name.
    pub name: String,
    /// Largest inbound frame accepted, in bytes.
    pub read_limit: Option<usize>,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            read_limit: RpcConfig::DEFAULT_READ_LIMIT,
        }
    }

    /// Reject a frame of `len` bytes if it exceeds the read limit.
    pub fn check_frame(&self, len: usize) -> Result<()> {
        match self.read_limit {
            Some(limit) if len > limit => Err(RpcError::FrameTooLarge { size: len, limit }),
            _ => Ok(()),
        }
    }
}
