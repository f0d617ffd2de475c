//! coin98-connect: dApp to wallet requests over deep links, replies over a queue.
//!
//! # Architecture
//!
//! ```text
//! Client (entry point)
//!   │
//!   ├── Session (Disconnected → Connecting → Connected, reconnect policy)
//!   │
//!   ├── Correlator
//!   │     ├── canonical: WalletRequest → wallet wire params (base-58)
//!   │     ├── envelope:  RequestEnvelope → percent-encoded JSON
//!   │     ├── invoker:   coin98://app/<method>/<payload> → Launcher
//!   │     └── PendingRequests: id → one-shot reply slot
//!   │
//!   ├── Listener (DeliveryChannel → filter appId → resolve waiter)
//!   │
//!   └── Collaborators
//!         ├── BridgeApi (authenticate, send-message)
//!         └── KeyValueStore (uuid, accessToken, session)
//! ```
//!
//! # Operations
//!
//! | Operation | Method | Description |
//! |-----------|--------|-------------|
//! | connect | `client.connect(chain, options)` | Handshake with the wallet |
//! | request | `client.request(WalletRequest)` | Typed wallet call, reconnecting if allowed |
//! | request_raw | `client.request_raw(method, params)` | Untyped `{method, params}` call |
//! | disconnect | `client.disconnect()` | Drop the session, release the launcher |
//! | signers | `client.offline_signer(chain_id)` | Cosmos signer adapters |
//!
//! # Features
//!
//! - `native` - tokio runtime, reqwest collaborator, file store, tracing
//!
//! # Usage
//!
//! ```ignore
//! use coin98_connect::{Client, ClientConfig, Collaborators, ConnectOptions, HttpApi, FileStore, SystemLauncher};
//!
//! let config = ClientConfig::from_env("https://dapp.example");
//! let client = Client::new(config.clone(), Collaborators {
//!     api: Arc::new(HttpApi::new(&config.server_endpoint)?),
//!     store: Arc::new(FileStore::for_app("my-dapp")),
//!     launcher: Arc::new(SystemLauncher),
//!     channel: Arc::new(queue),
//! }).await?;
//!
//! client.connect("solana", ConnectOptions::new("My dApp")).await?;
//! let signed = client.request_raw("sol_signMessage", vec![json!("hello")]).await?;
//! ```

// =============================================================================
// Shared modules (compile everywhere)
// =============================================================================

pub mod canonical;
pub mod config;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod session;
pub mod storage;

// =============================================================================
// Native modules
// =============================================================================

#[cfg(feature = "native")]
pub mod api;
#[cfg(feature = "native")]
pub mod client;
#[cfg(feature = "native")]
pub mod correlation;
#[cfg(feature = "native")]
pub mod invoker;
#[cfg(feature = "native")]
pub mod listener;
#[cfg(feature = "native")]
pub mod logging;
#[cfg(feature = "native")]
pub mod runtime;
#[cfg(feature = "native")]
pub mod signer;

// =============================================================================
// Re-exports
// =============================================================================

pub use canonical::{Binary, CosmosRequest, SerializeMessage, SignDoc, SolanaPayload, SolanaRequest, WalletRequest};
pub use config::{ClientConfig, LinkStyle, ReconnectPolicy};
pub use envelope::RequestEnvelope;
pub use error::{ConnectError, ConnectResult, ListenerError};
pub use session::{ConnectOptions, SessionState};
pub use storage::{KeyValueStore, MemoryStore};

#[cfg(feature = "native")]
pub use api::{BridgeApi, ConnectionNotice, HttpApi};
#[cfg(feature = "native")]
pub use client::{Client, ClientRegistry, Collaborators};
#[cfg(feature = "native")]
pub use invoker::{Launcher, QueuedLauncher, SystemLauncher};
#[cfg(feature = "native")]
pub use listener::{DeliveryChannel, InboundMessage, MemoryChannel, MemorySender};
#[cfg(feature = "native")]
pub use runtime::Shutdown;
#[cfg(feature = "native")]
pub use signer::{AccountData, OfflineSigner, OfflineSignerOnlyAmino};
#[cfg(feature = "native")]
pub use storage::FileStore;
