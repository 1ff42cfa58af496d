use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use nostr_sdk::prelude::*;
use tracing::{debug, warn};

use crate::client::RelayClient;
use crate::entry::{dedup_tag, EventConverter};
use crate::ledger::Ledger;

/// A resolved repost target can itself be a repost; follow at most one level
/// so a chain of reposts cannot recurse unboundedly.
const MAX_RESOLUTION_DEPTH: u8 = 1;

/// Whether an event is a repost (kind 6) or generic repost (kind 16).
pub fn is_repost(event: &Event) -> bool {
    matches!(event.kind, Kind::Repost | Kind::GenericRepost)
}

/// A target referenced by a repost event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepostTarget {
    Event(EventId),
    Address(Coordinate),
}

impl RepostTarget {
    /// The dedup id the target will materialize under. Matches
    /// [`dedup_tag`] for the corresponding fetched event.
    pub fn dedup_id(&self) -> String {
        match self {
            Self::Event(id) => id.to_hex(),
            Self::Address(coordinate) if coordinate.kind.is_addressable() => format!(
                "{}:{}:{}",
                coordinate.kind.as_u16(),
                coordinate.public_key,
                coordinate.identifier
            ),
            Self::Address(coordinate) => {
                format!("{}:{}", coordinate.kind.as_u16(), coordinate.public_key)
            }
        }
    }

    /// Filter matching exactly this target.
    pub fn filter(&self) -> Filter {
        match self {
            Self::Event(id) => Filter::new().id(*id),
            Self::Address(coordinate) => {
                let mut filter = Filter::new()
                    .kind(coordinate.kind)
                    .author(coordinate.public_key);
                if !coordinate.identifier.is_empty() {
                    filter = filter.identifier(coordinate.identifier.clone());
                }
                filter
            }
        }
    }
}

/// All targets a repost event references (`e` tags and `a` tags). A repost
/// may reference several targets.
pub fn repost_targets(event: &Event) -> Vec<RepostTarget> {
    let mut targets = Vec::new();
    for tag in event.tags.iter() {
        match tag.as_standardized() {
            Some(TagStandard::Event { event_id, .. }) => {
                targets.push(RepostTarget::Event(*event_id));
            }
            Some(TagStandard::Coordinate { coordinate, .. }) => {
                targets.push(RepostTarget::Address(coordinate.clone()));
            }
            _ => {}
        }
    }
    targets
}

/// Routes incoming events into the ledger, resolving repost references.
///
/// Plain events insert directly. Repost events are merged onto their target's
/// `reposted_by` metadata; targets not materialized yet are fetched from the
/// relay pool first. A failed fetch drops only that repost's contribution.
pub struct RepostResolver<T> {
    ledger: Arc<Mutex<Ledger<T>>>,
    client: Arc<dyn RelayClient>,
    converter: Arc<dyn EventConverter<T>>,
}

impl<T: Clone + Send + 'static> RepostResolver<T> {
    pub fn new(
        ledger: Arc<Mutex<Ledger<T>>>,
        client: Arc<dyn RelayClient>,
        converter: Arc<dyn EventConverter<T>>,
    ) -> Self {
        Self {
            ledger,
            client,
            converter,
        }
    }

    /// Route one incoming event: plain events insert, reposts resolve.
    pub async fn process(&self, event: Event) {
        self.process_at_depth(event, 0).await;
    }

    fn process_at_depth(&self, event: Event, depth: u8) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if !is_repost(&event) {
                self.insert_plain(&event);
                return;
            }
            if depth >= MAX_RESOLUTION_DEPTH {
                warn!(event_id = %event.id, depth, "dropping nested repost");
                return;
            }
            self.resolve_repost(event, depth).await;
        })
    }

    fn insert_plain(&self, event: &Event) {
        let entity = self.converter.convert(event);
        let id = dedup_tag(event);
        let Ok(mut ledger) = self.ledger.lock() else {
            warn!(event_id = %event.id, "ledger mutex poisoned; dropping event");
            return;
        };
        ledger.insert(id, Some(event.created_at), entity);
    }

    async fn resolve_repost(&self, repost: Event, depth: u8) {
        let targets = repost_targets(&repost);
        if targets.is_empty() {
            debug!(event_id = %repost.id, "repost references no targets");
            return;
        }

        for target in targets {
            let target_id = target.dedup_id();
            if self.try_attach(&target_id, &repost) {
                continue;
            }

            let fetched = match self.client.fetch_events(vec![target.filter()]).await {
                Ok(events) => events,
                Err(err) => {
                    warn!(target = %target_id, error = %err, "repost target fetch failed");
                    continue;
                }
            };
            for event in fetched {
                self.process_at_depth(event, depth + 1).await;
            }

            // The target, if the fetch found it, is materialized now; merge
            // the repost onto it.
            self.try_attach(&target_id, &repost);
        }
    }

    fn try_attach(&self, target_id: &str, repost: &Event) -> bool {
        let Ok(mut ledger) = self.ledger.lock() else {
            warn!(target = %target_id, "ledger mutex poisoned; dropping repost");
            return false;
        };
        ledger.attach_repost(target_id, repost)
    }
}
