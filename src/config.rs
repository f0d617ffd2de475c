//! Client Configuration - passed from the embedding dApp

use crate::error::ConnectError;
use sha2::{Digest, Sha256};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SCHEME: &str = "coin98";
pub const DEFAULT_SERVER_ENDPOINT: &str = "https://connect.coin98.com/api/";

/// How the deep link embeds the encoded envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStyle {
    /// `<scheme>://app/<method>/<payload>` (browser variant)
    #[default]
    MethodPath,
    /// `<scheme>://app/<payload>` (platform variant)
    FullUrl,
}

/// When `request()` may transparently re-run `connect` while disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// Only after a prior successful connect armed the flag.
    #[default]
    AfterConnect,
    /// Whenever an app id exists and a chain has been recorded.
    Always,
    Never,
}

impl ReconnectPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconnectPolicy::AfterConnect => "after-connect",
            ReconnectPolicy::Always => "always",
            ReconnectPolicy::Never => "never",
        }
    }

}

impl FromStr for ReconnectPolicy {
    type Err = ConnectError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "after-connect" | "armed" => Ok(ReconnectPolicy::AfterConnect),
            "always" => Ok(ReconnectPolicy::Always),
            "never" | "off" => Ok(ReconnectPolicy::Never),
            other => Err(ConnectError::invalid(format!("unknown reconnect policy {other:?}"))),
        }
    }
}

/// Client configuration. The dApp constructs this.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// dApp origin, e.g. `https://dapp.example`
    pub origin: String,
    pub callback_url: Option<String>,
    pub scheme: String,
    pub server_endpoint: String,
    pub link_style: LinkStyle,
    pub reconnect: ReconnectPolicy,
    /// `None` keeps a request pending until its reply arrives.
    pub request_timeout: Option<Duration>,
    /// Pause after a delivery-channel error before polling again.
    pub listener_backoff: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            origin: String::new(),
            callback_url: None,
            scheme: DEFAULT_SCHEME.into(),
            server_endpoint: DEFAULT_SERVER_ENDPOINT.into(),
            link_style: LinkStyle::default(),
            reconnect: ReconnectPolicy::default(),
            request_timeout: None,
            listener_backoff: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    pub fn new(origin: impl Into<String>) -> Self {
        Self { origin: origin.into(), ..Default::default() }
    }
    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self { self.callback_url = Some(url.into()); self }
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self { self.scheme = scheme.into(); self }
    pub fn with_server_endpoint(mut self, url: impl Into<String>) -> Self { self.server_endpoint = url.into(); self }
    pub fn with_link_style(mut self, style: LinkStyle) -> Self { self.link_style = style; self }
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self { self.reconnect = policy; self }
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self { self.request_timeout = Some(timeout); self }
    pub fn with_listener_backoff(mut self, backoff: Duration) -> Self { self.listener_backoff = backoff; self }

    /// Overlay `COIN98_CONNECT_*` environment variables on the defaults.
    pub fn from_env(origin: impl Into<String>) -> Self {
        let mut config = Self::new(origin);
        if let Ok(server) = std::env::var("COIN98_CONNECT_SERVER") {
            config.server_endpoint = server;
        }
        if let Ok(scheme) = std::env::var("COIN98_CONNECT_SCHEME") {
            config.scheme = scheme;
        }
        if let Ok(callback) = std::env::var("COIN98_CONNECT_CALLBACK") {
            config.callback_url = Some(callback);
        }
        if let Some(policy) = std::env::var("COIN98_CONNECT_RECONNECT")
            .ok()
            .and_then(|v| v.parse::<ReconnectPolicy>().ok())
        {
            config.reconnect = policy;
        }
        if let Some(ms) = std::env::var("COIN98_CONNECT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.request_timeout = Some(Duration::from_millis(ms));
        }
        config
    }

    /// URL handed back to the wallet so it can return to the dApp.
    pub fn redirect_target(&self) -> &str {
        self.callback_url.as_deref().unwrap_or(&self.origin)
    }

    /// Stable hex digest of the fields that identify a logical client.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.origin.as_str(),
            self.callback_url.as_deref().unwrap_or(""),
            self.scheme.as_str(),
            self.server_endpoint.as_str(),
            self.reconnect.as_str(),
        ] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        hasher.update([self.link_style as u8]);
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_and_redirect() {
        let config = ClientConfig::new("https://dapp.example");
        assert_eq!(config.scheme, "coin98");
        assert_eq!(config.redirect_target(), "https://dapp.example");
        assert!(config.request_timeout.is_none());

        let config = config.with_callback_url("https://dapp.example/done?x=1");
        assert_eq!(config.redirect_target(), "https://dapp.example/done?x=1");
    }

    #[test]
    fn fingerprint_tracks_identity_fields() {
        let a = ClientConfig::new("https://a.example");
        let b = ClientConfig::new("https://a.example");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        // Timeouts do not change which client is meant.
        let timed = b.clone().with_request_timeout(Duration::from_secs(5));
        assert_eq!(a.fingerprint(), timed.fingerprint());

        let other = ClientConfig::new("https://b.example");
        assert_ne!(a.fingerprint(), other.fingerprint());
        let native = a.clone().with_link_style(LinkStyle::FullUrl);
        assert_ne!(a.fingerprint(), native.fingerprint());
    }

    #[test]
    fn reconnect_policy_parsing() {
        assert_eq!(" Always ".parse::<ReconnectPolicy>().unwrap(), ReconnectPolicy::Always);
        assert_eq!("off".parse::<ReconnectPolicy>().unwrap(), ReconnectPolicy::Never);
        for policy in [ReconnectPolicy::AfterConnect, ReconnectPolicy::Always, ReconnectPolicy::Never] {
            assert_eq!(policy.as_str().parse::<ReconnectPolicy>().unwrap(), policy);
        }
        assert!(matches!(
            "sometimes".parse::<ReconnectPolicy>(),
            Err(ConnectError::InvalidArgument(_))
        ));
    }
}
