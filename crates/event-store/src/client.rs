use std::collections::HashSet;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use nostr_sdk::prelude::*;
use tokio::sync::broadcast;
use tracing::warn;

use crate::config::ClientConfig;
use crate::error::Error;

/// Typed notification emitted by a live subscription.
#[derive(Debug, Clone)]
pub enum SubscriptionMessage {
    Event(Box<Event>),
    /// All stored matching events have been delivered; the subscription is
    /// now live-streaming only. Emitted at most once per subscription.
    EndOfStoredEvents,
}

pub type EventStream = Pin<Box<dyn Stream<Item = SubscriptionMessage> + Send>>;

/// Opaque token identifying the relay-side subscriptions backing a store.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionHandle {
    ids: Vec<SubscriptionId>,
}

/// A running subscription: the message stream plus the token needed to stop
/// it via [`RelayClient::unsubscribe`].
pub struct ActiveSubscription {
    pub messages: EventStream,
    pub handle: SubscriptionHandle,
}

/// The protocol collaborator the engine is written against.
///
/// [`RelayPoolClient`] is the production implementation; tests supply their
/// own to drive deterministic event interleavings.
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Open one subscription per filter and return the merged message stream.
    async fn subscribe(&self, filters: Vec<Filter>) -> Result<ActiveSubscription, Error>;

    /// Stop the relay-side subscriptions behind `handle`.
    async fn unsubscribe(&self, handle: SubscriptionHandle);

    /// One-shot fetch of stored events, used to resolve repost targets.
    async fn fetch_events(&self, filters: Vec<Filter>) -> Result<Vec<Event>, Error>;
}

/// [`RelayClient`] backed by an `nostr-sdk` relay pool.
#[derive(Clone)]
pub struct RelayPoolClient {
    client: Client,
    config: ClientConfig,
}

impl RelayPoolClient {
    pub async fn new(config: ClientConfig) -> Result<Self, Error> {
        let client = Client::default();
        for relay in &config.relays {
            client.add_relay(relay).await?;
        }
        client.connect().await;
        Ok(Self { client, config })
    }

    /// Wrap an already-configured client, sharing its relay pool.
    pub fn from_client(client: Client, config: ClientConfig) -> Self {
        Self { client, config }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl RelayClient for RelayPoolClient {
    async fn subscribe(&self, filters: Vec<Filter>) -> Result<ActiveSubscription, Error> {
        // The receiver must exist before the first REQ goes out, or events
        // delivered while later subscriptions are still being opened are lost.
        let receiver = self.client.notifications();
        let mut ids = Vec::with_capacity(filters.len());
        for filter in filters {
            let output = self.client.subscribe(filter, None).await?;
            ids.push(output.val);
        }
        let messages = notification_stream(receiver, ids.clone());
        Ok(ActiveSubscription {
            messages,
            handle: SubscriptionHandle { ids },
        })
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) {
        for id in &handle.ids {
            self.client.unsubscribe(id).await;
        }
    }

    async fn fetch_events(&self, filters: Vec<Filter>) -> Result<Vec<Event>, Error> {
        let mut events = Vec::new();
        for filter in filters {
            let fetched = self
                .client
                .fetch_events(filter, self.config.fetch_timeout)
                .await?;
            events.extend(fetched);
        }
        Ok(events)
    }
}

/// Adapt the relay pool's broadcast notifications into a per-store stream.
///
/// Events are forwarded only for the given subscription ids. A single
/// `EndOfStoredEvents` is emitted once every underlying subscription has
/// seen its first eose; later eose echoes from other relays are dropped.
fn notification_stream(
    receiver: broadcast::Receiver<RelayPoolNotification>,
    ids: Vec<SubscriptionId>,
) -> EventStream {
    struct StreamState {
        receiver: broadcast::Receiver<RelayPoolNotification>,
        ids: Vec<SubscriptionId>,
        pending_eose: HashSet<SubscriptionId>,
    }

    let state = StreamState {
        pending_eose: ids.iter().cloned().collect(),
        receiver,
        ids,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            match state.receiver.recv().await {
                Ok(RelayPoolNotification::Event {
                    subscription_id,
                    event,
                    ..
                }) => {
                    if state.ids.contains(&subscription_id) {
                        return Some((SubscriptionMessage::Event(event), state));
                    }
                }
                Ok(RelayPoolNotification::Message { message, .. }) => {
                    if let RelayMessage::EndOfStoredEvents(subscription_id) = message {
                        if state.pending_eose.remove(subscription_id.as_ref())
                            && state.pending_eose.is_empty()
                        {
                            return Some((SubscriptionMessage::EndOfStoredEvents, state));
                        }
                    }
                }
                Ok(RelayPoolNotification::Shutdown) => return None,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "relay notification stream lagged");
                }
            }
        }
    }))
}
