//! HTTP server implementation using Axum.
//!
//! The router is assembled from [`RouteHook`]s. Axum layers only wrap routes
//! that already exist, so the hooks are passed through [`hook::order`] to put
//! every route in place before the layers that depend on them.

use crate::functions;
use axum::response::IntoResponse;
use axum::routing::{get, MethodRouter};
use axum::{Json as JsonBody, Router};
use rig_rpc::hook::{self, Dependency};
use rig_rpc::{ws, Binary, Json, RpcConfig, Server, ServerBuilder};
use serde_json::json;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Name provided by every hook that adds routes.
const ROUTES: &str = "routes";

/// Settings for [`start_server`].
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
    pub read_limit: Option<usize>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            read_limit: RpcConfig::DEFAULT_READ_LIMIT,
        }
    }
}

/// A running server.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub binary: Server<Binary>,
    pub json: Server<Json>,
}

impl RunningServer {
    /// Cancel all live RPC connections.
    pub fn shutdown(&self) {
        self.binary.shutdown();
        self.json.shutdown();
    }
}

/// One step of router setup.
pub enum RouteHook {
    Health,
    Rpc {
        path: &'static str,
        route: MethodRouter,
    },
    Cors,
    Trace,
}

impl Dependency for RouteHook {
    fn provides(&self) -> &[&str] {
        match self {
            RouteHook::Health | RouteHook::Rpc { .. } => &[ROUTES],
            RouteHook::Cors | RouteHook::Trace => &[],
        }
    }

    fn depends_on(&self) -> &[&str] {
        match self {
            RouteHook::Health | RouteHook::Rpc { .. } => &[],
            RouteHook::Cors | RouteHook::Trace => &[ROUTES],
        }
    }
}

impl RouteHook {
    fn apply(self, router: Router) -> Router {
        match self {
            RouteHook::Health => router.route("/health", get(handle_health)),
            RouteHook::Rpc { path, route } => router.route(path, route),
            RouteHook::Cors => {
                // Development CORS: any origin, method and header.
                let cors = CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any);
                router.layer(cors)
            }
            RouteHook::Trace => router.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http())),
        }
    }
}

/// Health check handler.
pub async fn handle_health() -> impl IntoResponse {
    JsonBody(json!({"status": "ok"}))
}

fn builder<C: rig_rpc::Codec>(options: &ServerOptions) -> ServerBuilder<C> {
    let builder = ServerBuilder::new();
    match options.read_limit {
        Some(limit) => builder.read_limit(limit),
        None => builder,
    }
}

/// Build both RPC servers and the router serving them.
pub fn build_router(options: &ServerOptions) -> (Router, Server<Binary>, Server<Json>) {
    let binary = functions::register(builder::<Binary>(options)).build();
    let json = functions::register(builder::<Json>(options)).build();

    // Listed layers first; ordering moves them behind the routes.
    let hooks = vec![
        RouteHook::Trace,
        RouteHook::Cors,
        RouteHook::Health,
        RouteHook::Rpc {
            path: RpcConfig::BINARY_ROUTE,
            route: ws::route(binary.clone()),
        },
        RouteHook::Rpc {
            path: RpcConfig::JSON_ROUTE,
            route: ws::route(json.clone()),
        },
    ];
    let router = hook::order(hooks)
        .into_iter()
        .fold(Router::new(), |router, hook| hook.apply(router));
    (router, binary, json)
}

/// Start the HTTP server.
///
/// Returns once the listener is bound; the actual address is useful when the
/// port is 0.
pub async fn start_server(options: ServerOptions) -> anyhow::Result<RunningServer> {
    let (app, binary, json) = build_router(&options);

    let addr: SocketAddr = format!("{}:{}", options.host, options.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(RunningServer {
        addr: actual_addr,
        binary,
        json,
    })
}
