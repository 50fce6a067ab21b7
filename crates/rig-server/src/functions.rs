//! Functions served on both RPC endpoints.

use crate::printf::{self, PrintfRequest, PrintfResponse};
use rig_rpc::{middleware, Codec, Context, RpcError, ServerBuilder, StreamScope};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Largest `count` a client may ask for.
pub const MAX_COUNT: u32 = 10_000;

/// Input of `count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountRequest {
    /// Count from 1 up to and including this number.
    pub to: u32,
    /// Pause between items.
    #[serde(default)]
    pub interval_ms: u64,
}

/// Input of `log`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRequest {
    pub level: String,
    pub msg: String,
}

#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("count of {requested} exceeds the limit of {limit}")]
    CountTooLarge { requested: u32, limit: u32 },

    #[error("unknown log level {0:?}")]
    UnknownLevel(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Register the demo functions and the request tracing middleware.
pub fn register<C: Codec>(builder: ServerBuilder<C>) -> ServerBuilder<C> {
    builder
        .middleware(middleware::trace())
        .call("printf", printf_call::<C>)
        .start("count", count::<C>)
        .notify("log", log::<C>)
}

async fn printf_call<C: Codec>(
    _ctx: Context<C>,
    request: PrintfRequest,
) -> Result<PrintfResponse, Infallible> {
    Ok(printf::call(&request))
}

/// Stream `1..=to`, stopping early if the connection goes away.
async fn count<C: Codec>(
    stream: StreamScope<C, u32>,
    request: CountRequest,
) -> Result<(), FunctionError> {
    if request.to > MAX_COUNT {
        return Err(FunctionError::CountTooLarge {
            requested: request.to,
            limit: MAX_COUNT,
        });
    }
    let interval = Duration::from_millis(request.interval_ms);
    for n in 1..=request.to {
        if n > 1 && !interval.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = stream.context().cancelled() => {
                    debug!("count cancelled at {}", n);
                    return Ok(());
                }
            }
        }
        stream.yield_item(&n).await?;
    }
    Ok(())
}

/// Write a client-supplied message to the server log.
async fn log<C: Codec>(ctx: Context<C>, request: LogRequest) -> Result<(), FunctionError> {
    ctx.span().in_scope(|| {
        match request.level.as_str() {
            "error" => error!(target: "client", "{}", request.msg),
            "warn" => warn!(target: "client", "{}", request.msg),
            "info" => info!(target: "client", "{}", request.msg),
            "debug" => debug!(target: "client", "{}", request.msg),
            other => return Err(FunctionError::UnknownLevel(other.to_string())),
        }
        Ok(())
    })
}
