use std::sync::{Arc, Mutex};

use nostr_sdk::prelude::*;
use reactive_store::{ObserverHandle, Writable};

use crate::client::RelayClient;
use crate::config::StoreOptions;
use crate::entry::{EventConverter, StoreEntry};
use crate::error::Error;
use crate::ledger::Ledger;
use crate::repost::RepostResolver;
use crate::subscription::SubscriptionController;

/// A reactive, deduplicated, time-ordered view over a set of relay filters.
///
/// Cloning yields another handle to the same store: same published sequence,
/// same subscription lifecycle.
pub struct EventStore<T> {
    output: Writable<Vec<StoreEntry<T>>>,
    controller: Arc<SubscriptionController<T>>,
}

impl<T> Clone for EventStore<T> {
    fn clone(&self) -> Self {
        Self {
            output: self.output.clone(),
            controller: Arc::clone(&self.controller),
        }
    }
}

impl<T: Clone + Send + 'static> EventStore<T> {
    /// Observe the materialized sequence. The observer runs immediately with
    /// the current sequence, then after every change.
    pub fn subscribe(
        &self,
        observer: impl Fn(&Vec<StoreEntry<T>>) + Send + Sync + 'static,
    ) -> ObserverHandle<Vec<StoreEntry<T>>> {
        self.output.subscribe(observer)
    }

    /// Snapshot of the current materialized sequence.
    pub fn get(&self) -> Vec<StoreEntry<T>> {
        self.output.get()
    }

    /// Replace the published sequence, notifying observers synchronously.
    pub fn set(&self, entries: Vec<StoreEntry<T>>) {
        self.output.set(entries);
    }

    /// Mutate the published sequence in place, notifying observers.
    pub fn update(&self, f: impl FnOnce(&mut Vec<StoreEntry<T>>)) {
        self.output.update(f);
    }

    /// The underlying writable, for callers that want `set`/`update` access.
    pub fn writable(&self) -> &Writable<Vec<StoreEntry<T>>> {
        &self.output
    }

    /// See [`SubscriptionController::start_subscription`].
    pub async fn start_subscription(&self) -> Result<(), Error> {
        self.controller.start_subscription().await
    }

    /// Stop the relay subscription. Already-materialized entries stay
    /// published, and in-flight repost resolutions may still land.
    pub async fn unsubscribe(&self) {
        self.controller.unsubscribe().await;
    }

    /// Register a consumer reference; the first one starts the subscription.
    pub async fn retain(&self) -> Result<usize, Error> {
        self.controller.retain().await
    }

    /// Drop a consumer reference; the last one stops the subscription.
    pub async fn release(&self) -> usize {
        self.controller.release().await
    }

    /// Run `callback` once all stored events have been delivered.
    pub fn on_eose(&self, callback: impl FnOnce() + Send + 'static) {
        self.controller.on_eose(callback);
    }
}

/// Wire up a store without touching the network.
///
/// All side effects happen later, inside the subscription lifecycle
/// transitions (`start_subscription` / `retain`).
pub fn create_store<T>(
    client: Arc<dyn RelayClient>,
    filters: Vec<Filter>,
    options: StoreOptions,
    converter: Arc<dyn EventConverter<T>>,
) -> EventStore<T>
where
    T: Clone + Send + 'static,
{
    let output = Writable::new(Vec::new());
    let ledger = Arc::new(Mutex::new(Ledger::new(output.clone())));
    let resolver = Arc::new(RepostResolver::new(ledger, Arc::clone(&client), converter));
    let controller = Arc::new(SubscriptionController::new(
        client, filters, options, resolver,
    ));
    EventStore { output, controller }
}

/// Create a store and, when auto-start is enabled (the default), open its
/// subscription before returning.
pub async fn subscribe_store<T>(
    client: Arc<dyn RelayClient>,
    filters: Vec<Filter>,
    options: StoreOptions,
    converter: Arc<dyn EventConverter<T>>,
) -> Result<EventStore<T>, Error>
where
    T: Clone + Send + 'static,
{
    let auto_start = options.auto_start;
    let store = create_store(client, filters, options, converter);
    if auto_start {
        store.start_subscription().await?;
    }
    Ok(store)
}
