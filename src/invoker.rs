//! Outbound invoker - turns an envelope into a wallet deep link and fires it.
//!
//! The invoker only launches; it never resolves a waiter.

use crate::config::LinkStyle;
use crate::envelope::{encode_component, RequestEnvelope};
use crate::error::{ConnectError, ConnectResult};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Platform capability that opens a URL in the wallet application.
pub trait Launcher: Send + Sync {
    fn open(&self, url: &str) -> ConnectResult<()>;

    fn is_available(&self) -> bool { true }

    /// Drop any platform handle held for the session.
    fn release(&self) {}
}

/// Builds links for one scheme and hands them to a [`Launcher`].
#[derive(Clone)]
pub struct OutboundInvoker {
    scheme: String,
    style: LinkStyle,
    launcher: Arc<dyn Launcher>,
}

impl OutboundInvoker {
    pub fn new(scheme: impl Into<String>, style: LinkStyle, launcher: Arc<dyn Launcher>) -> Self {
        Self { scheme: scheme.into(), style, launcher }
    }

    pub fn launcher(&self) -> &Arc<dyn Launcher> {
        &self.launcher
    }

    /// Deep link for an envelope. The encoded envelope is encoded once more as a
    /// path segment, so the wallet decodes twice.
    pub fn link_for(&self, envelope: &RequestEnvelope) -> ConnectResult<String> {
        let payload = encode_component(&envelope.encoded()?);
        Ok(match self.style {
            LinkStyle::MethodPath => format!("{}://app/{}/{}", self.scheme, envelope.method, payload),
            LinkStyle::FullUrl => format!("{}://app/{}", self.scheme, payload),
        })
    }

    pub fn invoke(&self, envelope: &RequestEnvelope) -> ConnectResult<()> {
        let link = self.link_for(envelope)?;
        tracing::debug!(method = %envelope.method, id = %envelope.id, "invoking wallet");
        self.launcher.open(&link)
    }
}

/// Opens links through the OS URL handler (`xdg-open`, `open`, `start`).
#[derive(Debug, Default, Clone)]
pub struct SystemLauncher;

#[cfg(target_os = "macos")]
const URL_OPENER: &[&str] = &["open"];
#[cfg(target_os = "windows")]
const URL_OPENER: &[&str] = &["cmd", "/C", "start", ""];
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const URL_OPENER: &[&str] = &["xdg-open"];

impl SystemLauncher {
    fn command(url: &str) -> Command {
        let mut cmd = Command::new(URL_OPENER[0]);
        cmd.args(&URL_OPENER[1..]).arg(url);
        cmd
    }
}

impl Launcher for SystemLauncher {
    fn open(&self, url: &str) -> ConnectResult<()> {
        let mut child = Self::command(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ConnectError::Launch(format!("url handler: {e}")))?;
        // reap the handler process
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }
}

/// Hands links to a receiver instead of opening them, for host shells that
/// route links themselves.
pub struct QueuedLauncher {
    tx: mpsc::UnboundedSender<String>,
    releases: AtomicUsize,
}

impl QueuedLauncher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, releases: AtomicUsize::new(0) }, rx)
    }

    /// How many times the session released this launcher.
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::Relaxed)
    }
}

impl Launcher for QueuedLauncher {
    fn open(&self, url: &str) -> ConnectResult<()> {
        self.tx
            .send(url.to_string())
            .map_err(|_| ConnectError::Launch("link receiver dropped".into()))
    }

    fn is_available(&self) -> bool {
        !self.tx.is_closed()
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }
}

/// Decode a link built by [`OutboundInvoker`] back into `(method, envelope)`.
pub fn parse_link(link: &str) -> Option<(Option<String>, RequestEnvelope)> {
    let (_, rest) = link.split_once("://app/")?;
    let (method, payload) = match rest.split_once('/') {
        Some((method, payload)) => (Some(method.to_string()), payload),
        None => (None, rest),
    };
    let once = percent_encoding::percent_decode_str(payload).decode_utf8().ok()?;
    let json = percent_encoding::percent_decode_str(&once).decode_utf8().ok()?;
    let envelope = serde_json::from_str(&json).ok()?;
    Some((method, envelope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope() -> RequestEnvelope {
        RequestEnvelope::new(
            "42".into(),
            "sol_signMessage",
            vec![json!("Cn8eVZg")],
            "app-1",
            Some("sol".into()),
            None,
            "https://dapp.example",
        )
    }

    #[test]
    fn method_path_link() {
        let (launcher, mut rx) = QueuedLauncher::new();
        let invoker = OutboundInvoker::new("coin98", LinkStyle::MethodPath, Arc::new(launcher));
        invoker.invoke(&envelope()).unwrap();

        let link = rx.try_recv().unwrap();
        assert!(link.starts_with("coin98://app/sol_signMessage/%257B"));
        let (method, decoded) = parse_link(&link).unwrap();
        assert_eq!(method.as_deref(), Some("sol_signMessage"));
        assert_eq!(decoded, envelope());
    }

    #[test]
    fn full_url_link_has_no_method_segment() {
        let (launcher, _rx) = QueuedLauncher::new();
        let invoker = OutboundInvoker::new("coin98", LinkStyle::FullUrl, Arc::new(launcher));
        let link = invoker.link_for(&envelope()).unwrap();
        assert!(link.starts_with("coin98://app/%257B"));
        let (method, decoded) = parse_link(&link).unwrap();
        assert!(method.is_none());
        assert_eq!(decoded.id, "42");
    }

    #[test]
    fn dropped_receiver_fails_launch() {
        let (launcher, rx) = QueuedLauncher::new();
        drop(rx);
        assert!(!launcher.is_available());
        let invoker = OutboundInvoker::new("coin98", LinkStyle::MethodPath, Arc::new(launcher));
        assert!(matches!(invoker.invoke(&envelope()), Err(ConnectError::Launch(_))));
    }
}
