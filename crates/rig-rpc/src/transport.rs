//! Message-oriented transport boundary.
//!
//! The connection loop only needs an ordered stream of inbound [`Frame`]s and a
//! sink for outbound ones. Anything that frames messages itself (WebSocket,
//! an in-memory channel) fits behind these two aliases.

use bytes::Bytes;
use futures::{Sink, Stream};
use std::pin::Pin;
use thiserror::Error;

/// One transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Binary(Bytes),
    Text(String),
    /// The peer asked to close the connection.
    Close,
}

/// Frame type an encoding reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Binary,
    Text,
}

/// Errors raised by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether the error only reports that the peer went away.
    pub fn is_closed(&self) -> bool {
        match self {
            TransportError::Closed => true,
            TransportError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            TransportError::Other(_) => false,
        }
    }
}

/// Inbound half of a connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// Outbound half of a connection.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// In-memory transport, mostly for tests and embedding.
pub mod memory {
    use super::*;
    use futures::channel::mpsc;
    use futures::{SinkExt, StreamExt};

    /// The server side of an in-memory connection.
    pub struct MemoryConnection {
        pub reader: FrameStream,
        pub writer: FrameSink,
    }

    /// The client side of an in-memory connection.
    pub struct MemoryPeer {
        tx: Option<mpsc::UnboundedSender<Result<Frame, TransportError>>>,
        rx: mpsc::UnboundedReceiver<Frame>,
    }

    /// Create a connected server/client pair.
    pub fn pair() -> (MemoryConnection, MemoryPeer) {
        let (client_tx, server_rx) = mpsc::unbounded();
        let (server_tx, client_rx) = mpsc::unbounded::<Frame>();

        let writer = server_tx.sink_map_err(|_| TransportError::Closed);
        let connection = MemoryConnection {
            reader: Box::pin(server_rx),
            writer: Box::pin(writer),
        };
        let peer = MemoryPeer {
            tx: Some(client_tx),
            rx: client_rx,
        };
        (connection, peer)
    }

    impl MemoryPeer {
        /// Deliver a frame to the server.
        pub fn send(&self, frame: Frame) -> Result<(), TransportError> {
            self.push(Ok(frame))
        }

        /// Make the server's next read fail with `err`.
        pub fn inject_error(&self, err: TransportError) -> Result<(), TransportError> {
            self.push(Err(err))
        }

        /// Close the client's sending half; the server reads end-of-stream.
        pub fn close(&mut self) {
            self.tx.take();
        }

        /// Next frame written by the server, or `None` once the server has
        /// released its writer.
        pub async fn recv(&mut self) -> Option<Frame> {
            self.rx.next().await
        }

        /// Frame written by the server if one is already queued.
        pub fn try_recv(&mut self) -> Option<Frame> {
            self.rx.try_next().ok().flatten()
        }

        fn push(&self, item: Result<Frame, TransportError>) -> Result<(), TransportError> {
            let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
            tx.unbounded_send(item).map_err(|_| TransportError::Closed)
        }
    }
}
