use std::collections::HashSet;

use nostr_sdk::prelude::*;
use reactive_store::Writable;

use crate::entry::StoreEntry;

/// Outcome of [`Ledger::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    Inserted,
    /// The id was already materialized; nothing changed and nothing was
    /// published.
    Duplicate,
}

/// Owns the seen-id set and the ordered materialized sequence.
///
/// The two structures only ever mutate together inside [`Ledger::insert`],
/// and every successful mutation publishes a fresh clone of the full
/// sequence to the output store, so observers never see a torn state.
///
/// Invariant: `entries` is sorted by non-increasing `created_at`, ties kept
/// in first-seen order.
pub struct Ledger<T> {
    seen_ids: HashSet<String>,
    entries: Vec<StoreEntry<T>>,
    output: Writable<Vec<StoreEntry<T>>>,
}

impl<T: Clone> Ledger<T> {
    pub fn new(output: Writable<Vec<StoreEntry<T>>>) -> Self {
        Self {
            seen_ids: HashSet::new(),
            entries: Vec::new(),
            output,
        }
    }

    /// Insert an entity under `id`, keeping descending-timestamp order.
    ///
    /// Inserting an already-seen id is a silent no-op. The scan looks for the
    /// first existing entry strictly older than the new one, so entries with
    /// equal timestamps stay in arrival order.
    pub fn insert(
        &mut self,
        id: String,
        created_at: Option<Timestamp>,
        entity: T,
    ) -> InsertResult {
        if self.seen_ids.contains(&id) {
            return InsertResult::Duplicate;
        }

        let position = self
            .entries
            .iter()
            .position(|existing| sorts_before(created_at, existing.created_at))
            .unwrap_or(self.entries.len());

        self.seen_ids.insert(id.clone());
        self.entries
            .insert(position, StoreEntry::new(id, created_at, entity));
        self.publish();
        InsertResult::Inserted
    }

    /// Merge a repost onto the entry materialized under `target_id`.
    ///
    /// Returns `false` without mutating when the target is not materialized
    /// yet. Reposts never get a row of their own.
    pub fn attach_repost(&mut self, target_id: &str, repost: &Event) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.id == target_id) else {
            return false;
        };
        // The same repost can arrive on both the primary and the repost
        // subscription; count it once.
        if entry.reposted_by.iter().any(|seen| seen.id == repost.id) {
            return true;
        }
        entry.reposted_by.push(repost.clone());
        self.publish();
        true
    }

    pub fn entries(&self) -> &[StoreEntry<T>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn publish(&self) {
        self.output.set(self.entries.clone());
    }
}

/// True when an incoming entry with timestamp `incoming` belongs strictly
/// before an existing entry with timestamp `existing`.
///
/// Untimestamped entries never overtake anything; timestamped entries
/// overtake untimestamped ones. This yields a total order even with missing
/// or equal timestamps.
fn sorts_before(incoming: Option<Timestamp>, existing: Option<Timestamp>) -> bool {
    match (incoming, existing) {
        (Some(new), Some(old)) => old < new,
        (Some(_), None) => true,
        (None, _) => false,
    }
}
