//! Type-erased handlers and the typed wrappers that produce them.
//!
//! Every registered function ends up as a [`Handler`]: something that takes
//! ownership of a [`Scope`] and runs to completion. The wrappers here decode
//! the request input into the function's declared input type, call user code,
//! and turn its result into the right terminal response. A decode failure
//! never reaches user code.

use crate::codec::Codec;
use crate::error::{Result, RpcError};
use crate::protocol::status;
use crate::scope::{Context, Scope, StreamScope};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// A type-erased request handler.
pub type Handler<C> = Arc<dyn Fn(Scope<C>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async function over a raw [`Scope`].
///
/// The function owns the scope and is responsible for sending the terminal
/// response itself.
pub fn raw<C, F, Fut>(f: F) -> Handler<C>
where
    C: Codec,
    F: Fn(Scope<C>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |scope: Scope<C>| -> BoxFuture<'static, ()> { Box::pin(f(scope)) })
}

/// Wrap a single-response function.
///
/// `Ok` becomes a success response, `Err` a 500 failure carrying the error's
/// message.
pub fn call<C, I, O, E, F, Fut>(f: F) -> Handler<C>
where
    C: Codec,
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + Sync + 'static,
    E: Display + Send + 'static,
    F: Fn(Context<C>, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<O, E>> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |scope: Scope<C>| -> BoxFuture<'static, ()> {
        let f = f.clone();
        Box::pin(async move {
            let Some(input) = decode_or_reject::<C, I>(&scope).await else {
                return;
            };
            let result = match f(scope.context().clone(), input).await {
                Ok(output) => match scope.succeed(&output).await {
                    Err(err @ RpcError::Encode(_)) => {
                        scope.fail(status::INTERNAL, err.to_string()).await
                    }
                    sent => sent,
                },
                Err(err) => scope.fail(status::INTERNAL, err.to_string()).await,
            };
            report(&scope, result);
        })
    })
}

/// Wrap a streaming function.
///
/// The function only gets a yield-only view of the scope; once it returns, the
/// stream is ended, or failed with a 500 if it returned an error.
pub fn start<C, I, O, E, F, Fut>(f: F) -> Handler<C>
where
    C: Codec,
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    E: Display + Send + 'static,
    F: Fn(StreamScope<C, O>, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |scope: Scope<C>| -> BoxFuture<'static, ()> {
        let f = f.clone();
        Box::pin(async move {
            let Some(input) = decode_or_reject::<C, I>(&scope).await else {
                return;
            };
            let result = match f(scope.stream::<O>(), input).await {
                Ok(()) => scope.end().await,
                Err(err) => scope.fail(status::INTERNAL, err.to_string()).await,
            };
            report(&scope, result);
        })
    })
}

/// Wrap a fire-and-forget function.
///
/// Errors are logged. If the request did carry an id, it is answered like a
/// stream that yielded nothing.
pub fn notify<C, I, E, F, Fut>(f: F) -> Handler<C>
where
    C: Codec,
    I: DeserializeOwned + Send + 'static,
    E: Display + Send + 'static,
    F: Fn(Context<C>, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |scope: Scope<C>| -> BoxFuture<'static, ()> {
        let f = f.clone();
        Box::pin(async move {
            let Some(input) = decode_or_reject::<C, I>(&scope).await else {
                return;
            };
            let result = match f(scope.context().clone(), input).await {
                Ok(()) => scope.end().await,
                Err(err) => {
                    if !scope.request().expects_response() {
                        warn!(
                            "Notification {:?} failed: {}",
                            scope.request().function,
                            err
                        );
                    }
                    scope.fail(status::INTERNAL, err.to_string()).await
                }
            };
            report(&scope, result);
        })
    })
}

/// Decode the scope's input, answering with a 406 when that fails.
async fn decode_or_reject<C: Codec, I: DeserializeOwned>(scope: &Scope<C>) -> Option<I> {
    match scope.decode_input::<I>() {
        Ok(input) => Some(input),
        Err(err) => {
            let err = RpcError::Decode(err);
            if !scope.request().expects_response() {
                warn!(
                    "Dropping notification {:?}: {}",
                    scope.request().function,
                    err
                );
            }
            report(scope, scope.fail(status::BAD_INPUT, err.to_string()).await);
            None
        }
    }
}

/// Log the outcome of a response the framework sent on a handler's behalf.
pub(crate) fn report<C: Codec>(scope: &Scope<C>, result: Result<()>) {
    let request = scope.request();
    match result {
        Ok(()) => {}
        Err(RpcError::ResponseNotSupported) if !request.expects_response() => {}
        Err(err) if err.is_connection_fatal() => {
            debug!(
                "Response to {:?} ({}) dropped: {}",
                request.function, request.id, err
            );
        }
        Err(err) => {
            warn!(
                "Failed to respond to {:?} ({}): {}",
                request.function, request.id, err
            );
        }
    }
}
