//! Cancellation token for connection and request contexts.
//!
//! A server owns a root token, each connection derives a child from it, and
//! every request scope on that connection shares the connection's token.
//! Cancelling a token cancels all of its descendants but never its parent.
//!
//! # Example
//!
//! ```
//! use rig_rpc::cancel::CancellationToken;
//!
//! let server = CancellationToken::new();
//! let connection = server.child_token();
//!
//! server.cancel();
//! assert!(connection.is_cancelled());
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug)]
struct Inner {
    cancelled: watch::Sender<bool>,
    parent: Option<CancellationToken>,
}

/// A cancellation token for cooperative cancellation of handlers.
///
/// Clones share state. Cancellation is observed either by polling
/// [`is_cancelled`](Self::is_cancelled) or by awaiting
/// [`cancelled`](Self::cancelled).
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// Create a new root token.
    pub fn new() -> Self {
        Self::with_parent(None)
    }

    fn with_parent(parent: Option<CancellationToken>) -> Self {
        let (cancelled, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner { cancelled, parent }),
        }
    }

    /// Request cancellation of this token and every token derived from it.
    pub fn cancel(&self) {
        self.inner.cancelled.send_replace(true);
    }

    /// Check if cancellation has been requested here or on any ancestor.
    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.borrow()
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(CancellationToken::is_cancelled)
    }

    /// Create a token that is cancelled with this one but can also be
    /// cancelled on its own.
    pub fn child_token(&self) -> Self {
        Self::with_parent(Some(self.clone()))
    }

    /// Wait until the token is cancelled.
    pub fn cancelled(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let mut own = self.inner.cancelled.subscribe();
            match &self.inner.parent {
                Some(parent) => {
                    tokio::select! {
                        _ = own.wait_for(|cancelled| *cancelled) => {}
                        _ = parent.cancelled() => {}
                    }
                }
                None => {
                    let _ = own.wait_for(|cancelled| *cancelled).await;
                }
            }
        })
    }

    /// Check cancellation and return an error if cancelled.
    ///
    /// Handy in handler loops that want to bail out with `?`.
    pub fn check(&self) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            Err(CancelledError)
        } else {
            Ok(())
        }
    }
}

/// Error returned when an operation is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("connection closed while the request was running")]
pub struct CancelledError;
