use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use futures::StreamExt;
use nostr_sdk::prelude::*;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{RelayClient, SubscriptionHandle, SubscriptionMessage};
use crate::config::StoreOptions;
use crate::error::Error;
use crate::repost::{is_repost, RepostResolver};

type EoseCallback = Box<dyn FnOnce() + Send>;

/// End-of-stored-events latch.
///
/// Callbacks registered before the signal fires run when it fires; callbacks
/// registered after run immediately. Each callback runs at most once. The
/// latch is re-armed when the subscription stops, so a restarted subscription
/// reports its own backlog delivery rather than the previous run's.
pub(crate) struct EoseSignal {
    fired: AtomicBool,
    callbacks: StdMutex<Vec<EoseCallback>>,
}

impl EoseSignal {
    fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
            callbacks: StdMutex::new(Vec::new()),
        }
    }

    pub(crate) fn register(&self, callback: impl FnOnce() + Send + 'static) {
        {
            let mut callbacks = self
                .callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            // Checked under the lock so a concurrent fire() cannot strand the
            // callback in the queue.
            if !self.fired.load(Ordering::Acquire) {
                callbacks.push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    fn fire(&self) {
        let drained: Vec<EoseCallback> = {
            let mut callbacks = self
                .callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.fired.store(true, Ordering::Release);
            callbacks.drain(..).collect()
        };
        for callback in drained {
            callback();
        }
    }

    /// Re-arm the latch. Callbacks queued while re-armed wait for the next
    /// fire; already-run callbacks are gone.
    fn reset(&self) {
        // Taken for the same reason register() checks `fired` under the lock:
        // a concurrent register() must see a consistent fired flag.
        let _callbacks = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.fired.store(false, Ordering::Release);
    }
}

enum SubscriptionState {
    Idle,
    Started {
        task: JoinHandle<()>,
        handle: SubscriptionHandle,
    },
}

struct Lifecycle {
    refs: usize,
    state: SubscriptionState,
}

/// Owns the relay subscription behind one store.
///
/// The subscription is live exactly while the consumer reference count is
/// above zero (or after an explicit `start_subscription`). Stopping returns
/// to idle so a later start re-opens cleanly; in-flight repost resolutions
/// are not cancelled and may still update the ledger after a stop.
pub struct SubscriptionController<T> {
    client: Arc<dyn RelayClient>,
    filters: Vec<Filter>,
    options: StoreOptions,
    resolver: Arc<RepostResolver<T>>,
    eose: Arc<EoseSignal>,
    lifecycle: Mutex<Lifecycle>,
}

impl<T: Clone + Send + 'static> SubscriptionController<T> {
    pub(crate) fn new(
        client: Arc<dyn RelayClient>,
        filters: Vec<Filter>,
        options: StoreOptions,
        resolver: Arc<RepostResolver<T>>,
    ) -> Self {
        Self {
            client,
            filters,
            options,
            resolver,
            eose: Arc::new(EoseSignal::new()),
            lifecycle: Mutex::new(Lifecycle {
                refs: 0,
                state: SubscriptionState::Idle,
            }),
        }
    }

    /// Open the relay subscription and start routing its events.
    ///
    /// Fails with [`Error::MissingFilters`] when the store was built without
    /// filter criteria; no side effect happens in that case. A no-op when
    /// already started.
    pub async fn start_subscription(&self) -> Result<(), Error> {
        let mut lifecycle = self.lifecycle.lock().await;
        self.start_locked(&mut lifecycle).await
    }

    async fn start_locked(&self, lifecycle: &mut Lifecycle) -> Result<(), Error> {
        if matches!(lifecycle.state, SubscriptionState::Started { .. }) {
            debug!("subscription already started");
            return Ok(());
        }
        if self.filters.is_empty() {
            return Err(Error::MissingFilters);
        }

        let mut filters = self.filters.clone();
        if let Some(repost_filters) = &self.options.repost_filters {
            filters.extend(repost_filters.iter().cloned());
        }

        let subscription = self.client.subscribe(filters).await?;
        let handle = subscription.handle.clone();
        let mut messages = subscription.messages;
        let resolver = Arc::clone(&self.resolver);
        let eose = Arc::clone(&self.eose);

        let task = tokio::spawn(async move {
            while let Some(message) = messages.next().await {
                match message {
                    SubscriptionMessage::Event(event) if is_repost(&event) => {
                        // Resolution suspends on a relay fetch; run it
                        // detached so stopping the subscription never cancels
                        // an in-flight resolution.
                        let resolver = Arc::clone(&resolver);
                        tokio::spawn(async move { resolver.process(*event).await });
                    }
                    SubscriptionMessage::Event(event) => resolver.process(*event).await,
                    SubscriptionMessage::EndOfStoredEvents => {
                        debug!("end of stored events");
                        eose.fire();
                    }
                }
            }
            debug!("subscription stream ended");
        });

        lifecycle.state = SubscriptionState::Started { task, handle };
        info!(filters = self.filters.len(), "store subscription started");
        Ok(())
    }

    /// Stop the relay subscription. No-op while idle.
    pub async fn unsubscribe(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        self.stop_locked(&mut lifecycle).await;
    }

    async fn stop_locked(&self, lifecycle: &mut Lifecycle) {
        match std::mem::replace(&mut lifecycle.state, SubscriptionState::Idle) {
            SubscriptionState::Idle => {}
            SubscriptionState::Started { task, handle } => {
                self.client.unsubscribe(handle).await;
                task.abort();
                // A later start opens a fresh subscription with its own
                // backlog; eose from the previous run must not leak into it.
                self.eose.reset();
                info!("store subscription stopped");
            }
        }
    }

    /// Register a consumer; the first reference opens the subscription.
    /// Returns the new reference count.
    pub async fn retain(&self) -> Result<usize, Error> {
        let mut lifecycle = self.lifecycle.lock().await;
        lifecycle.refs += 1;
        if lifecycle.refs == 1 {
            if let Err(err) = self.start_locked(&mut lifecycle).await {
                lifecycle.refs -= 1;
                return Err(err);
            }
        }
        Ok(lifecycle.refs)
    }

    /// Release a consumer; the last release tears the subscription down.
    ///
    /// Releasing past zero clamps at zero and is a logged no-op. Returns the
    /// new reference count.
    pub async fn release(&self) -> usize {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.refs == 0 {
            warn!("release() called with no active references");
            return 0;
        }
        lifecycle.refs -= 1;
        if lifecycle.refs == 0 {
            self.stop_locked(&mut lifecycle).await;
        }
        lifecycle.refs
    }

    /// Run `callback` once the subscription has delivered all stored events.
    /// Runs immediately if that already happened.
    pub fn on_eose(&self, callback: impl FnOnce() + Send + 'static) {
        self.eose.register(callback);
    }
}
