//! Per-request execution context and the only path for emitting responses.
//!
//! A [`Scope`] is created for every inbound request right before dispatch. It
//! owns the request, a cancellable [`Context`] derived from the connection, and
//! a response slot bound to the connection's [`Outbox`]. The slot is emptied the
//! moment a terminal response goes out; anything sent after that fails with
//! [`RpcError::ResponseNotSupported`].
//!
//! All writes on a connection go through one [`Outbox`], which holds the
//! transport sink behind an async mutex so frames from concurrent handlers are
//! never interleaved.

use crate::cancel::CancellationToken;
use crate::codec::{response_frame, Codec};
use crate::config::RpcConfig;
use crate::error::{DecodeError, Result, RpcError};
use crate::protocol::{Fail, Request, Response, ResponseBody};
use crate::transport::{Frame, FrameSink, TransportError};
use futures::SinkExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

struct OutboxInner {
    sink: Mutex<Option<FrameSink>>,
    sealed: AtomicBool,
    next_call_id: AtomicU64,
    failure: Mutex<Option<TransportError>>,
    failed: CancellationToken,
}

/// Single-writer handle on a connection's outbound half.
///
/// Clones share the same sink.
#[derive(Clone)]
pub struct Outbox {
    inner: Arc<OutboxInner>,
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("sealed", &self.is_sealed())
            .finish_non_exhaustive()
    }
}

impl Outbox {
    pub fn new(sink: FrameSink) -> Self {
        Self {
            inner: Arc::new(OutboxInner {
                sink: Mutex::new(Some(sink)),
                sealed: AtomicBool::new(false),
                next_call_id: AtomicU64::new(1),
                failure: Mutex::new(None),
                failed: CancellationToken::new(),
            }),
        }
    }

    /// Write one frame. The whole frame is written before any other sender
    /// gets the sink.
    ///
    /// A failed write seals the outbox and is kept for the connection loop;
    /// the caller gets [`RpcError::ConnectionClosed`].
    pub async fn send(&self, frame: Frame) -> Result<()> {
        let mut guard = self.inner.sink.lock().await;
        if self.is_sealed() {
            return Err(RpcError::ConnectionClosed);
        }
        let sink = guard.as_mut().ok_or(RpcError::ConnectionClosed)?;
        if let Err(e) = sink.send(frame).await {
            // A sink that returned an error must not be polled again.
            guard.take();
            self.seal();
            debug!("Connection write failed: {}", e);
            *self.inner.failure.lock().await = Some(e);
            self.inner.failed.cancel();
            return Err(RpcError::ConnectionClosed);
        }
        Ok(())
    }

    /// Resolves once a write has failed. The connection loop watches this to
    /// end the connection.
    pub async fn failed(&self) {
        self.inner.failed.cancelled().await
    }

    /// The write error that broke the connection, if any. Returned once.
    pub async fn take_failure(&self) -> Option<TransportError> {
        self.inner.failure.lock().await.take()
    }

    /// Refuse all further writes without releasing the sink.
    pub fn seal(&self) {
        self.inner.sealed.store(true, Ordering::SeqCst);
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.sealed.load(Ordering::SeqCst)
    }

    /// Seal, then close and release the sink.
    pub async fn close(&self) {
        self.seal();
        let sink = self.inner.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                debug!("Closing connection sink failed: {}", e);
            }
        }
    }

    fn next_call_id(&self) -> String {
        let n = self.inner.next_call_id.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", RpcConfig::SERVER_CALL_ID_PREFIX, n)
    }
}

/// Out-of-band sends to the client on the same connection.
///
/// These neither need nor consume a request id and are unaffected by the
/// terminal-response rule.
pub struct Peer<C> {
    outbox: Outbox,
    _codec: PhantomData<fn() -> C>,
}

impl<C> Clone for Peer<C> {
    fn clone(&self) -> Self {
        Self {
            outbox: self.outbox.clone(),
            _codec: PhantomData,
        }
    }
}

impl<C: Codec> Peer<C> {
    pub fn new(outbox: Outbox) -> Self {
        Self {
            outbox,
            _codec: PhantomData,
        }
    }

    /// Push a notification to the client.
    pub async fn notify<T: Serialize + ?Sized>(&self, function: &str, params: &T) -> Result<()> {
        let body = ResponseBody::Notify {
            function: function.to_string(),
            params: Some(C::encode_payload(params)?),
        };
        let frame = response_frame::<C>(&Response::new("", body))?;
        self.outbox.send(frame).await
    }

    /// Send a server-initiated call to the client and return the id it was
    /// sent under. Replies from the client are not routed back.
    pub async fn request<T: Serialize + ?Sized>(&self, function: &str, params: &T) -> Result<String> {
        let id = self.outbox.next_call_id();
        let body = ResponseBody::Call {
            function: function.to_string(),
            params: Some(C::encode_payload(params)?),
        };
        let frame = response_frame::<C>(&Response::new(id.clone(), body))?;
        self.outbox.send(frame).await?;
        Ok(id)
    }
}

/// What a handler gets to know about the request it serves.
///
/// Cheap to clone; handlers may hand clones to tasks they spawn.
pub struct Context<C> {
    id: String,
    function: String,
    token: CancellationToken,
    span: tracing::Span,
    metadata: BTreeMap<String, String>,
    peer: Peer<C>,
}

impl<C> Clone for Context<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            function: self.function.clone(),
            token: self.token.clone(),
            span: self.span.clone(),
            metadata: self.metadata.clone(),
            peer: self.peer.clone(),
        }
    }
}

impl<C: Codec> Context<C> {
    /// Request id; empty for notifications.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    /// Token cancelled when the connection closes.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Replace the cancellation token, e.g. with a child that a middleware
    /// cancels on a deadline.
    pub fn set_token(&mut self, token: CancellationToken) {
        self.token = token;
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until the connection closes.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Span handlers should log under.
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub fn set_span(&mut self, span: tracing::Span) {
        self.span = span;
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Attach request-scoped metadata.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn peer(&self) -> &Peer<C> {
        &self.peer
    }

    pub async fn notify<T: Serialize + ?Sized>(&self, function: &str, params: &T) -> Result<()> {
        self.peer.notify(function, params).await
    }

    pub async fn request<T: Serialize + ?Sized>(&self, function: &str, params: &T) -> Result<String> {
        self.peer.request(function, params).await
    }
}

/// The id-bound response path shared by a [`Scope`] and its stream views.
struct Responder<C> {
    slot: Arc<Mutex<Option<Outbox>>>,
    id: String,
    function: String,
    streaming: bool,
    _codec: PhantomData<fn() -> C>,
}

impl<C> Clone for Responder<C> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            id: self.id.clone(),
            function: self.function.clone(),
            streaming: self.streaming,
            _codec: PhantomData,
        }
    }
}

impl<C: Codec> Responder<C> {
    async fn send(&self, body: ResponseBody) -> Result<()> {
        let terminal = body.is_terminal();
        let mut slot = self.slot.lock().await;
        let outbox = slot.as_ref().ok_or(RpcError::ResponseNotSupported)?;
        if matches!(body, ResponseBody::Yield(_)) && !self.streaming {
            return Err(RpcError::NotStreaming {
                function: self.function.clone(),
            });
        }
        let frame = response_frame::<C>(&Response::new(self.id.clone(), body))?;
        let result = outbox.send(frame).await;
        if terminal {
            *slot = None;
        }
        result
    }

    async fn is_active(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}

/// The live handle a handler uses to respond to one request.
pub struct Scope<C> {
    request: Request,
    context: Context<C>,
    responder: Responder<C>,
}

impl<C: Codec> Scope<C> {
    /// Build a scope around a request and a send path.
    ///
    /// The connection loop does this for every inbound request; it is public
    /// so handlers can be driven directly in tests. Requests without an id get
    /// no response path, only the out-of-band one.
    pub fn for_request(request: Request, token: CancellationToken, outbox: Outbox) -> Self {
        let slot = request.expects_response().then(|| outbox.clone());
        let responder = Responder {
            slot: Arc::new(Mutex::new(slot)),
            id: request.id.clone(),
            function: request.function.clone(),
            streaming: request.kind.is_streaming(),
            _codec: PhantomData,
        };
        let context = Context {
            id: request.id.clone(),
            function: request.function.clone(),
            token,
            span: tracing::Span::current(),
            metadata: BTreeMap::new(),
            peer: Peer::new(outbox),
        };
        Self {
            request,
            context,
            responder,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn context(&self) -> &Context<C> {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context<C> {
        &mut self.context
    }

    /// Decode the request input into the handler's declared input type.
    pub fn decode_input<I: DeserializeOwned>(&self) -> std::result::Result<I, DecodeError> {
        C::decode_payload(self.request.input.as_deref())
    }

    /// Send the success-terminal response.
    pub async fn succeed<O: Serialize + ?Sized>(&self, output: &O) -> Result<()> {
        let output = C::encode_payload(output)?;
        self.responder.send(ResponseBody::Succ(Some(output))).await
    }

    /// Send one streaming item. Only streaming requests accept items.
    pub async fn yield_item<O: Serialize + ?Sized>(&self, output: &O) -> Result<()> {
        let output = C::encode_payload(output)?;
        self.responder.send(ResponseBody::Yield(Some(output))).await
    }

    /// Send the stream-end terminal response.
    pub async fn end(&self) -> Result<()> {
        self.responder.send(ResponseBody::End).await
    }

    /// Send the failure-terminal response.
    pub async fn fail(&self, code: i32, msg: impl Into<String>) -> Result<()> {
        self.responder
            .send(ResponseBody::Fail(Fail::new(code, msg)))
            .await
    }

    /// Whether a terminal response can still be sent.
    pub async fn is_active(&self) -> bool {
        self.responder.is_active().await
    }

    pub async fn notify<T: Serialize + ?Sized>(&self, function: &str, params: &T) -> Result<()> {
        self.context.notify(function, params).await
    }

    pub async fn request_client<T: Serialize + ?Sized>(
        &self,
        function: &str,
        params: &T,
    ) -> Result<String> {
        self.context.request(function, params).await
    }

    /// A view of this scope that can only yield items of type `O`.
    ///
    /// Streaming handlers get this instead of the scope, so the terminal
    /// response stays with whoever owns the scope.
    pub fn stream<O: Serialize>(&self) -> StreamScope<C, O> {
        StreamScope {
            responder: self.responder.clone(),
            context: self.context.clone(),
            _output: PhantomData,
        }
    }
}

/// Yield-only view of a streaming request's [`Scope`].
pub struct StreamScope<C, O> {
    responder: Responder<C>,
    context: Context<C>,
    _output: PhantomData<fn(&O)>,
}

impl<C, O> Clone for StreamScope<C, O> {
    fn clone(&self) -> Self {
        Self {
            responder: self.responder.clone(),
            context: self.context.clone(),
            _output: PhantomData,
        }
    }
}

impl<C: Codec, O: Serialize> StreamScope<C, O> {
    pub async fn yield_item(&self, item: &O) -> Result<()> {
        let output = C::encode_payload(item)?;
        self.responder.send(ResponseBody::Yield(Some(output))).await
    }

    pub fn context(&self) -> &Context<C> {
        &self.context
    }

    pub fn is_cancelled(&self) -> bool {
        self.context.is_cancelled()
    }
}
