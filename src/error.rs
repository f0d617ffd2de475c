//! Error kinds surfaced by the client facade.

use std::time::Duration;
use thiserror::Error;

/// Errors returned to callers of [`crate::Client`].
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Missing chain, missing dApp name, malformed params, or no launcher.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("You need to connect before handle any request!")]
    NotConnected,

    /// The wallet answered a connect request with an error or an empty result.
    #[error("{0}")]
    ConnectRejected(String),

    /// `disconnect` ran while the connect reply was still outstanding.
    #[error("Connect interrupted by disconnect")]
    Interrupted,

    #[error("Request {id} timed out after {after:?}")]
    Timeout { id: String, after: Duration },

    /// The waiter was torn down before any reply arrived.
    #[error("Request channel closed")]
    Closed,

    #[error("Launch failed: {0}")]
    Launch(String),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("Storage: {0}")]
    Storage(String),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ConnectResult<T> = Result<T, ConnectError>;

impl ConnectError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// Failures inside the inbound listener loop. Never returned to request callers.
#[derive(Error, Debug, Clone)]
pub enum ListenerError {
    #[error("transport: {0}")]
    Transport(String),

    #[error("malformed message: {0}")]
    Malformed(String),
}

impl From<anyhow::Error> for ListenerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Transport(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            ConnectError::NotConnected.to_string(),
            "You need to connect before handle any request!"
        );
        assert_eq!(
            ConnectError::ConnectRejected("Connect Rejected".into()).to_string(),
            "Connect Rejected"
        );
        let err: ListenerError = anyhow::anyhow!("queue down").into();
        assert_eq!(err.to_string(), "transport: queue down");
    }
}
