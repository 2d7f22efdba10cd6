//! Keyed live subscriptions.
//!
//! Each [`SubscriptionKey`] names one slot ("what is being watched"). A slot
//! holds at most one live store watch:
//! - Installing into an occupied slot tears the old watch down first
//! - Deliveries from a torn-down watch are recognised and discarded
//! - The last event projected for a slot is kept to suppress repeats
//!
//! # Example
//!
//! ```ignore
//! let mut subs = SubscriptionManager::new();
//! let target = SubscriptionTarget::TrackDocument(key.clone());
//! subs.replace(&store, SubscriptionKey::NowPlaying, target, || store.subscribe(&key, tx.clone()))?;
//!
//! for change in rx.try_iter() {
//!     if let Some((slot, target)) = subs.resolve(change.watch) {
//!         // project and emit
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{Subscription, SubscriptionKey, SubscriptionKind, SubscriptionTarget};
