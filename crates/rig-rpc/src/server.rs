//! Server construction and the default request router.
//!
//! A [`ServerBuilder`] collects functions and middleware; [`ServerBuilder::build`]
//! freezes them into a [`Server`], which is cheap to clone and serves any
//! number of connections concurrently.

use crate::cancel::CancellationToken;
use crate::codec::Codec;
use crate::config::ServerConfig;
use crate::connection;
use crate::error::Result;
use crate::handler::{self, report, Handler};
use crate::middleware::{self, Middleware};
use crate::registry::{Entry, EntryInfo, Registry, Table};
use crate::scope::{Context, Scope, StreamScope};
use crate::transport::{FrameSink, FrameStream};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::type_name;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// Collects a server's functions and middleware.
pub struct ServerBuilder<C> {
    registry: Registry<C>,
    middleware: Vec<Middleware<C>>,
    config: ServerConfig,
}

impl<C: Codec> Default for ServerBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> ServerBuilder<C> {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            middleware: Vec::new(),
            config: ServerConfig::new(C::NAME),
        }
    }

    /// Name used in logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Largest inbound frame accepted; larger frames end the connection.
    pub fn read_limit(mut self, limit: usize) -> Self {
        self.config.read_limit = Some(limit);
        self
    }

    /// Register a single-response function.
    pub fn call<I, O, E, F, Fut>(self, name: &str, f: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + Sync + 'static,
        E: Display + Send + 'static,
        F: Fn(Context<C>, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<O, E>> + Send + 'static,
    {
        let entry = Entry::new(handler::call(f), type_name::<I>(), type_name::<O>());
        self.register(Table::Call, name, entry)
    }

    /// Register a streaming function.
    pub fn start<I, O, E, F, Fut>(self, name: &str, f: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(StreamScope<C, O>, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
    {
        let entry = Entry::new(handler::start(f), type_name::<I>(), type_name::<O>());
        self.register(Table::Stream, name, entry)
    }

    /// Register a fire-and-forget function.
    pub fn notify<I, E, F, Fut>(self, name: &str, f: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(Context<C>, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
    {
        let entry = Entry::new(handler::notify(f), type_name::<I>(), type_name::<()>());
        self.register(Table::Stream, name, entry)
    }

    /// Register a raw handler that owns its scope.
    pub fn handle(self, table: Table, name: &str, handler: Handler<C>) -> Self {
        self.register(table, name, Entry::untyped(handler))
    }

    fn register(mut self, table: Table, name: &str, entry: Entry<C>) -> Self {
        if self.registry.register(table, name, entry).is_some() {
            debug!("{} function {:?} re-registered", table, name);
        }
        self
    }

    /// Add a middleware. The first one added is the outermost.
    pub fn middleware(mut self, middleware: Middleware<C>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn build(self) -> Server<C> {
        let registry = Arc::new(self.registry);
        info!(
            "{} server ready with {} functions",
            self.config.name,
            registry.len()
        );
        for entry in registry.entries() {
            debug!(
                "  {} {}({}) -> {}",
                entry.table, entry.name, entry.input, entry.output
            );
        }
        let handler = middleware::compose(&self.middleware, router(registry.clone()));
        Server {
            inner: Arc::new(ServerInner {
                registry,
                handler,
                config: self.config,
                token: CancellationToken::new(),
            }),
        }
    }
}

/// The innermost handler: route each request to its registered function, or
/// answer 404.
fn router<C: Codec>(registry: Arc<Registry<C>>) -> Handler<C> {
    Arc::new(move |scope: Scope<C>| -> BoxFuture<'static, ()> {
        let request = scope.request();
        match registry.lookup(&request.kind, &request.function) {
            Ok(entry) => (entry.handler)(scope),
            Err(err) => Box::pin(async move {
                if !scope.request().expects_response() {
                    debug!("Dropping notification: {}", err);
                }
                report(&scope, scope.fail(err.status_code(), err.to_string()).await);
            }),
        }
    })
}

struct ServerInner<C> {
    registry: Arc<Registry<C>>,
    handler: Handler<C>,
    config: ServerConfig,
    token: CancellationToken,
}

/// A built server. Clones share the same functions and shutdown state.
pub struct Server<C> {
    inner: Arc<ServerInner<C>>,
}

impl<C> Clone for Server<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Codec> Server<C> {
    pub fn builder() -> ServerBuilder<C> {
        ServerBuilder::new()
    }

    /// Serve one connection to completion.
    pub async fn serve(&self, reader: FrameStream, writer: FrameSink) -> Result<()> {
        connection::serve(
            self.inner.handler.clone(),
            &self.inner.config,
            self.inner.token.child_token(),
            reader,
            writer,
        )
        .await
    }

    /// Cancel every connection of this server, current and future.
    pub fn shutdown(&self) {
        info!("{} server shutting down", self.inner.config.name);
        self.inner.token.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn entries(&self) -> Vec<EntryInfo> {
        self.inner.registry.entries()
    }
}
