//! # Channelcast
//!
//! Realtime channel synchronization core: keeps many clients consistent with
//! shared, mutable "now playing" state and a set of owner-scoped broadcast
//! channels, using live store subscriptions instead of polling.
//!
//! ## Core Concepts
//!
//! - **Store**: a document store with live watches ([`ChannelStore`])
//! - **Subscriptions**: one live watch per slot, replaced atomically
//! - **Router**: turns UI commands into store writes and store changes into UI events
//! - **Bridge**: the single-threaded event loop a UI talks to
//!
//! ## Data flow
//!
//! ```text
//! UI command ─► UiBridge ─► BroadcastRouter ─► ChannelStore write
//!                                                   │
//! UI event   ◄─ UiBridge ◄─ BroadcastRouter ◄─ StoreChange (per watch)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use channelcast::{Command, MemoryStore, StaticAuthProvider, SyncConfig, TracingSink, UiBridge};
//!
//! let store = Arc::new(MemoryStore::new());
//! let (mut bridge, port) = UiBridge::new(
//!     store,
//!     Arc::new(StaticAuthProvider::signed_in("alice")),
//!     Arc::new(TracingSink),
//!     SyncConfig::default(),
//! )?;
//!
//! port.send(Command::SignInToFirebase);
//! port.send(Command::Broadcast("spotify:track:4uLU6hMCjMI75M1A2tKUQC".into()));
//! bridge.run_until_idle();
//!
//! for event in port.drain() {
//!     println!("{}", event.to_json()?);
//! }
//! ```

pub mod auth;
pub mod bridge;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod protocol;
pub mod router;
pub mod session;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use auth::{
    AuthCompletion, AuthFailure, AuthOutcome, AuthProvider, DeferredAuthProvider,
    StaticAuthProvider,
};
pub use bridge::{UiBridge, UiMessage, UiPort};
pub use config::SyncConfig;
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, MemorySink, Severity, TracingSink};
pub use error::{ErrorKind, Result, SyncError};
pub use protocol::{Command, Event};
pub use router::BroadcastRouter;
pub use session::SessionContext;
pub use store::{
    ChangePayload, ChangeSender, ChannelStore, MemoryStore, QueryFilter, StoreChange, WatchId,
};
pub use subscriptions::{
    Subscription, SubscriptionKey, SubscriptionKind, SubscriptionManager, SubscriptionTarget,
};
pub use types::*;
