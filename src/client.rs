//! Client facade
//!
//! ```text
//!            ┌──────────── Client ────────────┐
//! connect ──►│ Session ── Correlator ── Invoker├──► coin98://app/...
//! request ──►│    ▲            ▲               │
//!            │    │       PendingRequests ◄────┼── Listener ◄── DeliveryChannel
//!            │ KeyValueStore      BridgeApi    │
//!            └────────────────────────────────┘
//! ```
//!
//! One `Client` owns one session and one listener task. Clones share both.

use crate::api::{BridgeApi, ConnectionNotice};
use crate::canonical::{is_truthy, WalletRequest};
use crate::config::ClientConfig;
use crate::correlation::{Correlator, PendingRequests, RequestContext};
use crate::error::{ConnectError, ConnectResult, ListenerError};
use crate::ids;
use crate::invoker::{Launcher, OutboundInvoker};
use crate::listener::{DeliveryChannel, Listener};
use crate::runtime::Shutdown;
use crate::session::{ConnectOptions, Session, SessionState};
use crate::storage::{keys, KeyValueStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const DEFAULT_REJECTION: &str = "Connect Rejected";
const ERROR_CAPACITY: usize = 16;

/// Persisted under [`keys::SESSION`] after a successful connect.
#[derive(Debug, Serialize, Deserialize)]
struct SessionMarker {
    chain: String,
    name: String,
}

/// External capabilities a client is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub api: Arc<dyn BridgeApi>,
    pub store: Arc<dyn KeyValueStore>,
    pub launcher: Arc<dyn Launcher>,
    pub channel: Arc<dyn DeliveryChannel>,
}

struct Inner {
    config: ClientConfig,
    session: Mutex<Session>,
    correlator: Correlator,
    /// Serializes handshakes, including implicit reconnects.
    connect_lock: tokio::sync::Mutex<()>,
    /// Bumped after every finished handshake.
    handshakes: AtomicU64,
    api: Arc<dyn BridgeApi>,
    store: Arc<dyn KeyValueStore>,
    errors: broadcast::Sender<ListenerError>,
    shutdown: Shutdown,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn context(&self) -> RequestContext {
        let session = self.session();
        RequestContext {
            app_id: session.app_id.clone(),
            chain: session.chain.clone(),
            access_token: session.access_token.clone(),
            connected: session.is_connected(),
            redirect_target: self.config.redirect_target().to_string(),
        }
    }
}

/// Deep-link wallet client.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Load or provision the app id and access token, then start listening.
    pub async fn new(config: ClientConfig, collaborators: Collaborators) -> ConnectResult<Self> {
        let Collaborators { api, store, launcher, channel } = collaborators;

        let app_id = match store.get(keys::APP_ID)?.filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => {
                let id = ids::new_app_id();
                store.set(keys::APP_ID, &id)?;
                tracing::info!(app_id = %id, "provisioned app id");
                id
            }
        };
        let access_token = match store.get(keys::ACCESS_TOKEN)?.filter(|token| !token.is_empty()) {
            Some(token) => token,
            None => {
                let token = api.authenticate(&app_id).await?;
                store.set(keys::ACCESS_TOKEN, &token)?;
                token
            }
        };

        let mut session = Session::new(app_id.clone(), Some(access_token));
        session.callback_url = config.callback_url.clone();
        if let Some(raw) = store.get(keys::SESSION)? {
            match serde_json::from_str::<SessionMarker>(&raw) {
                Ok(marker) => session.restore(marker.chain, marker.name),
                Err(err) => tracing::warn!(error = %err, "ignoring unreadable session marker"),
            }
        }

        let pending = PendingRequests::new();
        let invoker = OutboundInvoker::new(config.scheme.clone(), config.link_style, launcher);
        let (errors, _) = broadcast::channel(ERROR_CAPACITY);
        let shutdown = Shutdown::new();

        let listener = Listener {
            channel,
            app_id,
            pending: pending.clone(),
            errors: errors.clone(),
            shutdown: shutdown.clone(),
            backoff: config.listener_backoff,
        }
        .spawn();

        Ok(Self {
            inner: Arc::new(Inner {
                correlator: Correlator::new(pending, invoker, config.request_timeout),
                config,
                session: Mutex::new(session),
                connect_lock: tokio::sync::Mutex::new(()),
                handshakes: AtomicU64::new(0),
                api,
                store,
                errors,
                shutdown,
                listener: Mutex::new(Some(listener)),
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn app_id(&self) -> String {
        self.inner.session().app_id.clone()
    }

    pub fn state(&self) -> SessionState {
        self.inner.session().state
    }

    pub fn is_connected(&self) -> bool {
        self.inner.session().is_connected()
    }

    /// Chain recorded by the last connect attempt.
    pub fn chain(&self) -> Option<String> {
        self.inner.session().chain.clone()
    }

    /// Transport failures seen by the listener.
    pub fn listener_errors(&self) -> broadcast::Receiver<ListenerError> {
        self.inner.errors.subscribe()
    }

    /// Requests still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.pending().len()
    }

    /// Handshake with the wallet. Arguments are validated before any side effect.
    pub async fn connect(&self, chain: &str, options: ConnectOptions) -> ConnectResult<Value> {
        if chain.is_empty() {
            return Err(ConnectError::invalid("Unsupported Chain ID"));
        }
        if !self.inner.correlator.invoker().launcher().is_available() {
            return Err(ConnectError::invalid("no wallet launcher available"));
        }
        if options.name.is_empty() {
            return Err(ConnectError::invalid("Dapps Name required"));
        }

        let _guard = self.inner.connect_lock.lock().await;
        self.handshake(chain, options).await
    }

    async fn handshake(&self, chain: &str, options: ConnectOptions) -> ConnectResult<Value> {
        let generation = self.inner.session().begin_connect(chain, &options);

        let result = match self.try_handshake(&options).await {
            Ok(reply) => {
                if self.inner.session().complete_connect(generation) {
                    self.persist_session(chain, &options.name);
                    tracing::info!(chain, dapp = %options.name, "connected");
                    Ok(reply)
                } else {
                    tracing::info!(chain, "connect reply arrived after disconnect");
                    Err(ConnectError::Interrupted)
                }
            }
            Err(err) => {
                self.inner.session().fail_connect(generation);
                tracing::warn!(chain, error = %err, "connect failed");
                Err(err)
            }
        };
        // After the state update, so waiters that see the new count see the outcome.
        self.inner.handshakes.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn try_handshake(&self, options: &ConnectOptions) -> ConnectResult<Value> {
        let (app_id, token) = {
            let session = self.inner.session();
            (session.app_id.clone(), session.access_token.clone().unwrap_or_default())
        };

        let notice = ConnectionNotice::connection_request(&app_id, &self.inner.config.origin);
        let message_id = self.inner.api.send_message(&token, &notice).await?;

        let request = WalletRequest::Connect(options.to_params(message_id.as_deref()));
        let reply = self.inner.correlator.send(&self.inner.context(), request).await?;
        match rejection(&reply) {
            Some(message) => Err(ConnectError::ConnectRejected(message)),
            None => Ok(reply),
        }
    }

    /// The marker seeds chain and dApp name on the next start.
    fn persist_session(&self, chain: &str, name: &str) {
        let marker = SessionMarker { chain: chain.to_string(), name: name.to_string() };
        let stored = serde_json::to_string(&marker)
            .map_err(ConnectError::from)
            .and_then(|raw| self.inner.store.set(keys::SESSION, &raw));
        if let Err(err) = stored {
            tracing::warn!(error = %err, "failed to persist session marker");
        }
    }

    /// Drop the session. Idempotent; pending requests keep waiting.
    pub fn disconnect(&self) {
        self.inner.session().disconnect();
        if let Err(err) = self.inner.store.remove(keys::SESSION) {
            tracing::warn!(error = %err, "failed to clear session marker");
        }
        self.inner.correlator.invoker().launcher().release();
        tracing::info!("disconnected");
    }

    /// Send a request, reconnecting first when the session allows it.
    pub async fn request(&self, request: WalletRequest) -> ConnectResult<Value> {
        if !request.is_connect() {
            self.reconnect_if_needed().await?;
        }
        let ctx = self.inner.context();
        self.inner.correlator.send(&ctx, request).await
    }

    /// Untyped `{method, params}` form of [`Client::request`].
    pub async fn request_raw(&self, method: &str, params: Vec<Value>) -> ConnectResult<Value> {
        self.request(WalletRequest::from_raw(method, params)?).await
    }

    /// Wait out an in-flight handshake, or run one when the policy allows.
    async fn reconnect_if_needed(&self) -> ConnectResult<()> {
        let policy = self.inner.config.reconnect;
        let seen = self.inner.handshakes.load(Ordering::SeqCst);
        let wait = {
            let session = self.inner.session();
            match session.state {
                SessionState::Connected => false,
                SessionState::Connecting => true,
                SessionState::Disconnected => session.reconnect_target(policy).is_some(),
            }
        };
        if !wait {
            return Ok(());
        }

        let _guard = self.inner.connect_lock.lock().await;
        // A handshake finished while we waited; its outcome stands.
        if self.inner.handshakes.load(Ordering::SeqCst) != seen {
            return Ok(());
        }
        let Some((chain, options)) = self.inner.session().reconnect_target(policy) else {
            return Ok(());
        };

        tracing::info!(chain = %chain, "reconnecting before request");
        self.handshake(&chain, options).await.map(|_| ())
    }

    /// Stop the listener and wait for it to exit.
    pub async fn shutdown(&self) {
        self.inner.shutdown.trigger();
        let handle = self.inner.listener.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// Failure message for a connect reply carrying `error`, `errors` or a falsy `result`.
fn rejection(reply: &Value) -> Option<String> {
    let error = ["error", "errors"]
        .iter()
        .find_map(|key| reply.get(key).filter(|value| is_truthy(value)));
    let message = |err: &Value| {
        err.get("message")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_REJECTION)
            .to_string()
    };
    match error {
        Some(err) => Some(message(err)),
        None if !reply.get("result").is_some_and(is_truthy) => Some(DEFAULT_REJECTION.to_string()),
        None => None,
    }
}

/// Shared clients keyed by configuration fingerprint.
#[derive(Default)]
pub struct ClientRegistry {
    clients: tokio::sync::Mutex<HashMap<String, Client>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing client for `config`, or a new one wired with `collaborators()`.
    pub async fn get_or_create<F>(&self, config: ClientConfig, collaborators: F) -> ConnectResult<Client>
    where
        F: FnOnce() -> Collaborators,
    {
        let key = config.fingerprint();
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }
        let client = Client::new(config, collaborators()).await?;
        clients.insert(key, client.clone());
        Ok(client)
    }

    pub async fn get(&self, config: &ClientConfig) -> Option<Client> {
        self.clients.lock().await.get(&config.fingerprint()).cloned()
    }

    pub async fn remove(&self, config: &ClientConfig) -> Option<Client> {
        self.clients.lock().await.remove(&config.fingerprint())
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejection_rules() {
        assert_eq!(rejection(&json!({"result": "ok"})), None);
        assert_eq!(rejection(&json!({"result": ""})).as_deref(), Some("Connect Rejected"));
        assert_eq!(rejection(&json!({})).as_deref(), Some("Connect Rejected"));
        assert_eq!(
            rejection(&json!({"result": "ok", "error": {"message": "User denied"}})).as_deref(),
            Some("User denied")
        );
        assert_eq!(
            rejection(&json!({"result": "ok", "errors": ["x"]})).as_deref(),
            Some("Connect Rejected")
        );
        assert_eq!(rejection(&json!({"result": "ok", "error": null})), None);
    }
}
