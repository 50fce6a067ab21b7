//! WebSocket endpoint adapter for axum.
//!
//! [`route`] is the opaque connection-handler factory handed to the HTTP
//! router: it upgrades the request and runs the server's connection loop on
//! the socket.

use crate::codec::Codec;
use crate::server::Server;
use crate::transport::{Frame, FrameSink, FrameStream, TransportError};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::routing::{get, MethodRouter};
use bytes::Bytes;
use futures::{future, SinkExt, StreamExt};
use tracing::{debug, error};

/// A `GET` route that serves `server` over WebSocket.
pub fn route<C, S>(server: Server<C>) -> MethodRouter<S>
where
    C: Codec,
    S: Clone + Send + Sync + 'static,
{
    get(move |upgrade: WebSocketUpgrade| {
        let server = server.clone();
        async move {
            let upgrade = match server.config().read_limit {
                Some(limit) => upgrade.max_message_size(limit).max_frame_size(limit),
                None => upgrade,
            };
            upgrade.on_upgrade(move |socket| async move {
                debug!("{} WebSocket connection upgraded", server.config().name);
                let (reader, writer) = split(socket);
                if let Err(e) = server.serve(reader, writer).await {
                    error!("RPC connection error: {}", e);
                }
            })
        }
    })
}

/// Split a socket into the frame stream and sink the connection loop uses.
///
/// Ping and pong messages are answered by axum and never surface as frames.
pub fn split(socket: WebSocket) -> (FrameStream, FrameSink) {
    let (sink, stream) = socket.split();

    let reader = stream.filter_map(|message| {
        future::ready(match message {
            Ok(Message::Binary(data)) => Some(Ok(Frame::Binary(Bytes::from(data)))),
            Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
            Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
            Err(e) => Some(Err(transport_error(e))),
        })
    });

    let writer = sink.sink_map_err(transport_error).with(|frame: Frame| {
        future::ready(Ok::<_, TransportError>(match frame {
            Frame::Binary(data) => Message::Binary(data.to_vec()),
            Frame::Text(text) => Message::Text(text),
            Frame::Close => Message::Close(None),
        }))
    });

    (Box::pin(reader), Box::pin(writer))
}

fn transport_error(err: axum::Error) -> TransportError {
    let err = err.into_inner();
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err.as_ref());
    while let Some(current) = source {
        if let Some(io) = current.downcast_ref::<std::io::Error>() {
            return TransportError::Io(std::io::Error::new(io.kind(), io.to_string()));
        }
        source = current.source();
    }
    TransportError::Other(err.to_string())
}
