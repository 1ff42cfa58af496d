use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("nostr client error: {0}")]
    NostrClient(#[from] nostr_sdk::client::Error),
    #[error("no filters configured for this store")]
    MissingFilters,
    #[error("relay fetch failed: {0}")]
    Fetch(String),
}
