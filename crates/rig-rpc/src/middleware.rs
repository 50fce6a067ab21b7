//! Handler-wrapping middleware.
//!
//! A middleware turns a [`Handler`] into another one. The first middleware
//! added to a server is the outermost: it sees the scope first and finishes
//! last.

use crate::codec::Codec;
use crate::handler::Handler;
use crate::scope::Scope;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{trace as trace_event, Instrument};

/// Wraps the top-level dispatch handler.
pub type Middleware<C> = Arc<dyn Fn(Handler<C>) -> Handler<C> + Send + Sync>;

/// Build a middleware from a closure.
pub fn from_fn<C, F>(f: F) -> Middleware<C>
where
    C: Codec,
    F: Fn(Handler<C>) -> Handler<C> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap `handler` in `middleware`, the first element outermost.
pub fn compose<C>(middleware: &[Middleware<C>], handler: Handler<C>) -> Handler<C> {
    middleware
        .iter()
        .rev()
        .fold(handler, |next, wrap| wrap(next))
}

/// Run each request inside a span carrying its id, kind and function, and log
/// its input at TRACE level.
pub fn trace<C: Codec>() -> Middleware<C> {
    from_fn(|next: Handler<C>| -> Handler<C> {
        Arc::new(move |mut scope: Scope<C>| -> BoxFuture<'static, ()> {
            let request = scope.request();
            let span = tracing::info_span!(
                "rpc",
                codec = C::NAME,
                id = %request.id,
                kind = %request.kind,
                function = %request.function,
            );
            trace_event!(
                parent: &span,
                input = %C::describe_payload(request.input.as_deref()),
                "Request"
            );
            scope.context_mut().set_span(span.clone());
            Box::pin(next(scope).instrument(span))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::handler;
    use crate::json::Json;
    use crate::protocol::{Request, RequestKind};
    use crate::scope::Outbox;
    use crate::transport::memory;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(name: &'static str, log: Log) -> Middleware<Json> {
        from_fn(move |next: Handler<Json>| -> Handler<Json> {
            let log = log.clone();
            Arc::new(move |scope: Scope<Json>| -> BoxFuture<'static, ()> {
                let log = log.clone();
                let next = next.clone();
                Box::pin(async move {
                    log.lock().unwrap().push(format!("{name} in"));
                    next(scope).await;
                    log.lock().unwrap().push(format!("{name} out"));
                })
            })
        })
    }

    fn scope() -> (Scope<Json>, memory::MemoryPeer) {
        let (conn, peer) = memory::pair();
        let request = Request::new("1", RequestKind::Call, "f", None);
        let scope = Scope::for_request(request, CancellationToken::new(), Outbox::new(conn.writer));
        (scope, peer)
    }

    #[tokio::test]
    async fn test_first_middleware_is_outermost() {
        let log = Log::default();
        let inner_log = log.clone();
        let handler = handler::raw(move |_scope: Scope<Json>| {
            let log = inner_log.clone();
            async move { log.lock().unwrap().push("handler".into()) }
        });

        let chain = [recording("a", log.clone()), recording("b", log.clone())];
        let (scope, _peer) = scope();
        compose(&chain, handler)(scope).await;

        assert_eq!(
            *log.lock().unwrap(),
            ["a in", "b in", "handler", "b out", "a out"]
        );
    }

    #[tokio::test]
    async fn test_middleware_can_attach_metadata() {
        let tag = from_fn(|next: Handler<Json>| -> Handler<Json> {
            Arc::new(move |mut scope: Scope<Json>| -> BoxFuture<'static, ()> {
                scope.context_mut().insert_metadata("user", "alice");
                next(scope)
            })
        });
        let handler = handler::raw(|scope: Scope<Json>| async move {
            let user = scope.context().metadata("user").unwrap_or("nobody").to_string();
            scope.succeed(&user).await.unwrap();
        });

        let (scope, mut peer) = scope();
        compose(&[tag, trace()], handler)(scope).await;

        let frame = peer.try_recv().unwrap();
        assert_eq!(frame, crate::transport::Frame::Text(r#"{"id":"1","result":"alice"}"#.into()));
    }

    #[tokio::test]
    async fn test_no_middleware_is_identity() {
        let handler = handler::raw(|scope: Scope<Json>| async move {
            scope.succeed(&1).await.unwrap();
        });
        let (scope, mut peer) = scope();
        compose(&[], handler)(scope).await;
        assert!(peer.try_recv().is_some());
    }
}
