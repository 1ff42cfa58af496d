use std::time::Duration;

use nostr_sdk::prelude::*;

/// Connection settings for [`RelayPoolClient`](crate::RelayPoolClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub relays: Vec<String>,
    /// Timeout applied to each repost-target fetch.
    pub fetch_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relays: Vec::new(),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Per-store options, fixed at construction time.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Open the relay subscription as soon as the store is built (default).
    /// When disabled, the subscription starts on the first consumer
    /// reference or on an explicit `start_subscription` call.
    pub auto_start: bool,
    /// Extra filters merged into the subscription to pick up repost events
    /// pointing at the primary filter set.
    pub repost_filters: Option<Vec<Filter>>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            auto_start: true,
            repost_filters: None,
        }
    }
}

impl StoreOptions {
    pub fn with_repost_filters(filters: Vec<Filter>) -> Self {
        Self {
            repost_filters: Some(filters),
            ..Default::default()
        }
    }
}
