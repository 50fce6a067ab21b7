//! Rig RPC - bidirectional RPC over message-based transports.
//!
//! A connection carries client requests (single-response calls, streaming
//! calls and fire-and-forget notifications) and everything the server sends
//! back, including out-of-band notifications and server-initiated calls. Two
//! wire encodings share one dispatch core: a compact binary tuple form
//! ([`Binary`]) and a JSON-RPC-like object form ([`Json`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use rig_rpc::{Context, Json, Server, StreamScope};
//!
//! let server = Server::<Json>::builder()
//!     .call("add", |_ctx: Context<Json>, (a, b): (i64, i64)| async move {
//!         Ok::<_, String>(a + b)
//!     })
//!     .start("count", |stream: StreamScope<Json, u32>, n: u32| async move {
//!         for i in 0..n {
//!             stream.yield_item(&i).await.map_err(|e| e.to_string())?;
//!         }
//!         Ok::<_, String>(())
//!     })
//!     .middleware(rig_rpc::middleware::trace())
//!     .build();
//!
//! let app = axum::Router::new().route("/jrpc", rig_rpc::ws::route(server));
//! ```

pub mod binary;
pub mod cancel;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod hook;
pub mod json;
pub mod middleware;
pub mod protocol;
pub mod registry;
pub mod scope;
pub mod server;
pub mod transport;
pub mod ws;

pub use binary::Binary;
pub use cancel::{CancellationToken, CancelledError};
pub use codec::Codec;
pub use config::{RpcConfig, ServerConfig};
pub use error::{DecodeError, EncodeError, Result, RpcError};
pub use handler::Handler;
pub use json::Json;
pub use middleware::Middleware;
pub use protocol::{status, Fail, Request, RequestKind, Response, ResponseBody};
pub use registry::{EntryInfo, Registry, Table};
pub use scope::{Context, Outbox, Peer, Scope, StreamScope};
pub use server::{Server, ServerBuilder};
pub use transport::{Frame, FrameType, TransportError};

/// Server speaking the binary encoding.
pub type BinaryServer = Server<Binary>;

/// Server speaking the JSON encoding.
pub type JsonServer = Server<Json>;
