//! The per-connection read/dispatch loop.
//!
//! Each decoded request runs on its own task, so one slow handler never holds
//! up the next read. All tasks write through the connection's single
//! [`Outbox`]. A failed write ends the connection just like a failed read.
//! When the loop exits, for whatever reason, the connection token is
//! cancelled, the outbox is sealed and every task is awaited before the
//! transport is released.
//!
//! Handlers are expected to observe cancellation. A handler that never returns
//! keeps its connection's drain waiting; nothing forcibly aborts it.

use crate::cancel::CancellationToken;
use crate::codec::{frame_bytes, Codec};
use crate::config::ServerConfig;
use crate::error::{DecodeError, Result, RpcError};
use crate::handler::{report, Handler};
use crate::protocol::{status, Request, RequestKind};
use crate::scope::{Outbox, Scope};
use crate::transport::{Frame, FrameSink, FrameStream};
use futures::StreamExt;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, Instrument};

/// Serve one connection until the peer goes away, the token is cancelled, or
/// an error fatal to the connection occurs.
///
/// A clean close, or a transport error on either half that only reports the
/// peer going away, returns `Ok`.
pub async fn serve<C: Codec>(
    handler: Handler<C>,
    config: &ServerConfig,
    token: CancellationToken,
    reader: FrameStream,
    writer: FrameSink,
) -> Result<()> {
    let span = tracing::debug_span!("connection", name = %config.name);
    run::<C>(handler, config, token, reader, writer)
        .instrument(span)
        .await
}

async fn run<C: Codec>(
    handler: Handler<C>,
    config: &ServerConfig,
    token: CancellationToken,
    mut reader: FrameStream,
    writer: FrameSink,
) -> Result<()> {
    let outbox = Outbox::new(writer);
    let mut tasks = JoinSet::new();
    debug!("{} connection opened", config.name);

    let result = loop {
        tokio::select! {
            frame = reader.next() => {
                let frame = match frame {
                    None | Some(Ok(Frame::Close)) => break Ok(()),
                    Some(Err(e)) if e.is_closed() => break Ok(()),
                    Some(Err(e)) => break Err(RpcError::from(e)),
                    Some(Ok(frame)) => frame,
                };
                let Some(bytes) = frame_bytes::<C>(&frame) else {
                    debug!("Ignoring frame of the wrong type on {} connection", config.name);
                    continue;
                };
                if let Err(e) = config.check_frame(bytes.len()) {
                    break Err(e);
                }
                match C::decode_request(bytes) {
                    Ok(request) => {
                        let scope = Scope::for_request(request, token.clone(), outbox.clone());
                        tasks.spawn(handler(scope).in_current_span());
                    }
                    Err(e) => match e.id.clone() {
                        Some(id) => {
                            let scope = rejection::<C>(id, &token, &outbox);
                            tasks.spawn(reject(scope, e).in_current_span());
                        }
                        None => break Err(RpcError::Decode(e)),
                    },
                }
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => finished(joined),
            _ = outbox.failed() => {
                break match outbox.take_failure().await {
                    Some(e) if !e.is_closed() => Err(RpcError::from(e)),
                    _ => Ok(()),
                };
            }
            _ = token.cancelled() => break Ok(()),
        }
    };

    token.cancel();
    outbox.seal();
    if !tasks.is_empty() {
        debug!("Waiting for {} in-flight handlers", tasks.len());
    }
    while let Some(joined) = tasks.join_next().await {
        finished(joined);
    }
    outbox.close().await;
    debug!("{} connection closed", config.name);
    result
}

/// A scope answering a request that could not be decoded past its id.
fn rejection<C: Codec>(id: String, token: &CancellationToken, outbox: &Outbox) -> Scope<C> {
    let request = Request::new(id, RequestKind::Call, "", None);
    Scope::for_request(request, token.clone(), outbox.clone())
}

async fn reject<C: Codec>(scope: Scope<C>, err: DecodeError) {
    let err = RpcError::Decode(err);
    debug!("Rejecting request {}: {}", scope.request().id, err);
    report(&scope, scope.fail(status::BAD_INPUT, err.to_string()).await);
}

fn finished(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("Handler panicked: {}", e);
        }
    }
}
