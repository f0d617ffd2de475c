//! Session state machine
//!
//! ```text
//! Disconnected ──begin_connect──► Connecting ──complete_connect──► Connected
//!      ▲                              │                               │
//!      └──────── fail_connect ────────┘                               │
//!      └───────────────────────── disconnect ─────────────────────────┘
//! ```

use crate::config::ReconnectPolicy;
use serde_json::{Map, Value};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
        }
    }
}

/// Options passed to `connect`. `name` is the dApp display name; every other
/// field is forwarded to the wallet untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectOptions {
    pub name: String,
    pub extra: Map<String, Value>,
}

impl ConnectOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), extra: Map::new() }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Connect params object: options plus the pre-registered message id.
    pub fn to_params(&self, message_id: Option<&str>) -> Value {
        let mut object = self.extra.clone();
        object.insert("name".into(), Value::String(self.name.clone()));
        if let Some(id) = message_id {
            object.insert("messageId".into(), Value::String(id.to_string()));
        }
        Value::Object(object)
    }
}

/// Per-client session record.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub app_id: String,
    pub chain: Option<String>,
    pub access_token: Option<String>,
    pub dapp_name: Option<String>,
    pub callback_url: Option<String>,
    pub state: SessionState,
    pub should_reconnect: bool,
    /// Options of the last connect attempt, replayed on reconnect.
    pub last_options: Option<ConnectOptions>,
    /// Bumped by every `disconnect`; a handshake started under an older
    /// generation cannot complete.
    pub generation: u64,
}

impl Session {
    pub fn new(app_id: impl Into<String>, access_token: Option<String>) -> Self {
        Self { app_id: app_id.into(), access_token, ..Default::default() }
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Returns the generation the handshake belongs to.
    pub fn begin_connect(&mut self, chain: &str, options: &ConnectOptions) -> u64 {
        self.chain = Some(chain.to_string());
        self.dapp_name = Some(options.name.clone());
        self.last_options = Some(options.clone());
        self.state = SessionState::Connecting;
        self.generation
    }

    /// False when a disconnect happened since `begin_connect`; the state is left alone.
    pub fn complete_connect(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        debug_assert!(self.chain.is_some() && self.dapp_name.is_some());
        self.state = SessionState::Connected;
        self.should_reconnect = true;
        true
    }

    pub fn fail_connect(&mut self, generation: u64) {
        if generation == self.generation {
            self.state = SessionState::Disconnected;
        }
    }

    pub fn disconnect(&mut self) {
        self.state = SessionState::Disconnected;
        self.generation += 1;
    }

    /// Seed chain and dApp name from a persisted `{chain, name}` marker.
    pub fn restore(&mut self, chain: impl Into<String>, name: impl Into<String>) {
        let name = name.into();
        self.chain = Some(chain.into());
        self.last_options = Some(ConnectOptions::new(name.clone()));
        self.dapp_name = Some(name);
    }

    /// Chain and options to replay if `request` should reconnect first.
    pub fn reconnect_target(&self, policy: ReconnectPolicy) -> Option<(String, ConnectOptions)> {
        if self.state != SessionState::Disconnected || self.app_id.is_empty() {
            return None;
        }
        let eligible = match policy {
            ReconnectPolicy::AfterConnect => self.should_reconnect,
            ReconnectPolicy::Always => true,
            ReconnectPolicy::Never => false,
        };
        if !eligible {
            return None;
        }
        let chain = self.chain.clone()?;
        let options = self
            .last_options
            .clone()
            .or_else(|| self.dapp_name.clone().map(ConnectOptions::new))?;
        Some((chain, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lifecycle_transitions() {
        let mut session = Session::new("app", None);
        assert_eq!(session.state, SessionState::Disconnected);

        let generation = session.begin_connect("eth", &ConnectOptions::new("Demo"));
        assert_eq!(session.state, SessionState::Connecting);
        assert!(!session.is_connected());

        assert!(session.complete_connect(generation));
        assert!(session.is_connected());
        assert!(session.should_reconnect);
        assert_eq!(session.chain.as_deref(), Some("eth"));
        assert_eq!(session.dapp_name.as_deref(), Some("Demo"));

        session.disconnect();
        session.disconnect();
        assert_eq!(session.state, SessionState::Disconnected);
    }

    #[test]
    fn failed_connect_does_not_arm_reconnect() {
        let mut session = Session::new("app", None);
        let generation = session.begin_connect("eth", &ConnectOptions::new("Demo"));
        session.fail_connect(generation);
        assert_eq!(session.state, SessionState::Disconnected);
        assert!(session.reconnect_target(ReconnectPolicy::AfterConnect).is_none());
        // The platform policy does not need the flag.
        let (chain, options) = session.reconnect_target(ReconnectPolicy::Always).unwrap();
        assert_eq!(chain, "eth");
        assert_eq!(options.name, "Demo");
        assert!(session.reconnect_target(ReconnectPolicy::Never).is_none());
    }

    #[test]
    fn reconnect_after_disconnect() {
        let mut session = Session::new("app", None);
        let options = ConnectOptions::new("Demo").with("logo", "https://x/logo.png");
        let generation = session.begin_connect("eth", &options);
        session.complete_connect(generation);
        assert!(session.reconnect_target(ReconnectPolicy::AfterConnect).is_none());

        session.disconnect();
        let (chain, replay) = session.reconnect_target(ReconnectPolicy::AfterConnect).unwrap();
        assert_eq!(chain, "eth");
        assert_eq!(replay, options);
    }

    #[test]
    fn disconnect_voids_an_inflight_handshake() {
        let mut session = Session::new("app", None);
        let generation = session.begin_connect("eth", &ConnectOptions::new("Demo"));
        session.disconnect();

        assert!(!session.complete_connect(generation));
        assert_eq!(session.state, SessionState::Disconnected);
        assert!(!session.should_reconnect);

        // A newer handshake is not failed by the stale one.
        let current = session.begin_connect("eth", &ConnectOptions::new("Demo"));
        session.fail_connect(generation);
        assert_eq!(session.state, SessionState::Connecting);
        assert!(session.complete_connect(current));
    }

    #[test]
    fn restored_marker_feeds_the_platform_policy() {
        let mut session = Session::new("app", None);
        session.restore("solana", "Demo");
        assert!(session.reconnect_target(ReconnectPolicy::AfterConnect).is_none());
        let (chain, options) = session.reconnect_target(ReconnectPolicy::Always).unwrap();
        assert_eq!(chain, "solana");
        assert_eq!(options, ConnectOptions::new("Demo"));
    }

    #[test]
    fn always_policy_needs_a_chain() {
        let session = Session::new("app", None);
        assert!(session.reconnect_target(ReconnectPolicy::Always).is_none());
    }

    #[test]
    fn connect_params_merge_options() {
        let options = ConnectOptions::new("Demo").with("url", "https://dapp.example");
        assert_eq!(
            options.to_params(Some("m-1")),
            json!({"name": "Demo", "url": "https://dapp.example", "messageId": "m-1"})
        );
        assert_eq!(options.to_params(None), json!({"name": "Demo", "url": "https://dapp.example"}));
    }
}
