//! Correlation engine - request ids to single-use reply slots
//!
//! ```text
//! send(request)
//!   │ guard (connected or connect)
//!   │ canonicalize → id → envelope
//!   │ register waiter            ◄── before invoking, so a fast reply is not lost
//!   │ invoke deep link
//!   ▼
//! wait ◄──────── PendingRequests::resolve(id, payload) ◄── listener
//! ```
//!
//! Replies are matched purely by id; there is no ordering across ids.

use crate::canonical::WalletRequest;
use crate::envelope::RequestEnvelope;
use crate::error::{ConnectError, ConnectResult};
use crate::ids;
use crate::invoker::OutboundInvoker;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

/// Outstanding requests keyed by id. Each slot is fulfilled at most once.
#[derive(Default)]
pub struct PendingRequests {
    waiters: Mutex<HashMap<String, oneshot::Sender<Value>>>,
}

impl PendingRequests {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn waiters(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<Value>>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(self: &Arc<Self>, id: &str) -> Waiter {
        let (tx, rx) = oneshot::channel();
        self.waiters().insert(id.to_string(), tx);
        Waiter { id: id.to_string(), rx, pending: Arc::clone(self) }
    }

    /// Deliver `payload` to the waiter for `id`. Returns false when no waiter
    /// is registered (never issued, or already resolved).
    pub fn resolve(&self, id: &str, payload: Value) -> bool {
        let Some(tx) = self.waiters().remove(id) else {
            return false;
        };
        tx.send(payload).is_ok()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.waiters().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.waiters().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn forget(&self, id: &str) {
        self.waiters().remove(id);
    }
}

/// Receiving half of a registered request. Dropping it deregisters the id.
pub struct Waiter {
    id: String,
    rx: oneshot::Receiver<Value>,
    pending: Arc<PendingRequests>,
}

impl Waiter {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Suspend until the reply arrives, or until `timeout` if one is set.
    pub async fn wait(mut self, timeout: Option<Duration>) -> ConnectResult<Value> {
        let reply = match timeout {
            None => (&mut self.rx).await,
            Some(after) => match tokio::time::timeout(after, &mut self.rx).await {
                Ok(reply) => reply,
                Err(_elapsed) => {
                    return Err(ConnectError::Timeout { id: self.id.clone(), after });
                }
            },
        };
        reply.map_err(|_| ConnectError::Closed)
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.pending.forget(&self.id);
    }
}

/// Session facts the engine stamps on every envelope.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub app_id: String,
    pub chain: Option<String>,
    pub access_token: Option<String>,
    pub connected: bool,
    pub redirect_target: String,
}

/// Issues requests and awaits their correlated replies.
pub struct Correlator {
    pending: Arc<PendingRequests>,
    invoker: OutboundInvoker,
    timeout: Option<Duration>,
}

impl Correlator {
    pub fn new(pending: Arc<PendingRequests>, invoker: OutboundInvoker, timeout: Option<Duration>) -> Self {
        Self { pending, invoker, timeout }
    }

    pub fn pending(&self) -> &Arc<PendingRequests> {
        &self.pending
    }

    pub fn invoker(&self) -> &OutboundInvoker {
        &self.invoker
    }

    /// Build the envelope for `request` and register its waiter.
    pub fn prepare(&self, ctx: &RequestContext, request: WalletRequest) -> ConnectResult<(RequestEnvelope, Waiter)> {
        if !ctx.connected && !request.is_connect() {
            return Err(ConnectError::NotConnected);
        }
        let request = request.canonicalize();
        let method = request.method().to_string();
        let envelope = RequestEnvelope::new(
            ids::next_request_id(),
            method,
            request.into_params(),
            ctx.app_id.clone(),
            ctx.chain.clone(),
            ctx.access_token.clone(),
            &ctx.redirect_target,
        );
        let waiter = self.pending.register(&envelope.id);
        Ok((envelope, waiter))
    }

    /// Returns the reply payload verbatim; interpreting it is the caller's job.
    pub async fn send(&self, ctx: &RequestContext, request: WalletRequest) -> ConnectResult<Value> {
        let (envelope, waiter) = self.prepare(ctx, request)?;
        self.invoker.invoke(&envelope)?;
        waiter.wait(self.timeout).await
    }
}
