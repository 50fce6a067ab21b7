//! Rig Server - WebSocket RPC server.
//!
//! Serves the binary RPC encoding at `/mrpc`, the JSON encoding at `/jrpc` and
//! a health check at `/health`.

mod functions;
mod printf;
mod server;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rig-server")]
#[command(about = "WebSocket RPC server with binary and JSON endpoints")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Largest accepted RPC message in bytes
    #[arg(long)]
    read_limit: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_logging(args: &Args) {
    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false);
    if args.json_logs {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    info!("Starting Rig RPC Server");

    let running = server::start_server(server::ServerOptions {
        host: args.host,
        port: args.port,
        read_limit: args.read_limit,
    })
    .await?;

    // Supervisors read the port from stdout.
    println!("RPC_PORT={}", running.addr.port());

    info!("RPC server running on {}", running.addr);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");
    running.shutdown();

    Ok(())
}
