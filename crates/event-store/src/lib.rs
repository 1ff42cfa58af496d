//! Live materialized views over Nostr relay subscriptions.
//!
//! This crate turns the unordered, duplicated stream of events delivered by
//! a relay pool into a single reactive collection that UI code can bind to:
//! deduplicated, sorted by descending `created_at`, with reposts merged onto
//! the events they reference instead of appearing as rows of their own.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          EVENT-STORE                             │
//! │                                                                  │
//! │  relay pool ──▶ SubscriptionController ──▶ RepostResolver        │
//! │  (RelayClient)   (lifecycle, eose)          (classify, fetch)    │
//! │                                                │                 │
//! │                                                ▼                 │
//! │                                             Ledger               │
//! │                                    (dedup, descending order)     │
//! │                                                │                 │
//! │                                                ▼                 │
//! │                                  Writable<Vec<StoreEntry<T>>>    │
//! │                                       (observer callbacks)       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use event_store::{subscribe_store, ClientConfig, IdentityConverter, RelayPoolClient, StoreOptions};
//! use nostr_sdk::prelude::*;
//! use std::sync::Arc;
//!
//! let config = ClientConfig {
//!     relays: vec!["wss://relay.damus.io".to_string()],
//!     ..Default::default()
//! };
//! let client = Arc::new(RelayPoolClient::new(config).await?);
//!
//! let notes = Filter::new().kind(Kind::TextNote).limit(100);
//! let reposts = Filter::new().kind(Kind::Repost);
//! let store = subscribe_store(
//!     client,
//!     vec![notes],
//!     StoreOptions::with_repost_filters(vec![reposts]),
//!     Arc::new(IdentityConverter),
//! )
//! .await?;
//!
//! store.on_eose(|| println!("backlog delivered"));
//! let handle = store.subscribe(|entries| {
//!     for entry in entries {
//!         println!("{} reposted {} times", entry.id, entry.reposted_by.len());
//!     }
//! });
//! ```
//!
//! # Lifecycle
//!
//! Stores are reference counted: [`EventStore::retain`] opens the relay
//! subscription on the first consumer, [`EventStore::release`] tears it down
//! with the last one. `subscribe_store` with the default options starts
//! immediately instead.

mod client;
mod config;
mod entry;
mod error;
mod ledger;
mod repost;
mod store;
mod subscription;

pub use client::{
    ActiveSubscription, EventStream, RelayClient, RelayPoolClient, SubscriptionHandle,
    SubscriptionMessage,
};
pub use config::{ClientConfig, StoreOptions};
pub use entry::{dedup_tag, EventConverter, IdentityConverter, StoreEntry};
pub use error::Error;
pub use ledger::{InsertResult, Ledger};
pub use repost::{is_repost, repost_targets, RepostResolver, RepostTarget};
pub use store::{create_store, subscribe_store, EventStore};
pub use subscription::SubscriptionController;

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
