use nostr_sdk::prelude::*;

/// A materialized row in a store's published sequence.
///
/// One entry per dedup id. Repost events referencing this entry accumulate in
/// `reposted_by` instead of producing rows of their own.
#[derive(Debug, Clone)]
pub struct StoreEntry<T> {
    /// Dedup identity (see [`dedup_tag`]), not necessarily the event hash.
    pub id: String,
    /// Ordering timestamp. Entries without one sort below all timestamped
    /// entries.
    pub created_at: Option<Timestamp>,
    /// The converted entity.
    pub entity: T,
    /// Repost events pointing at this entry, in arrival order.
    pub reposted_by: Vec<Event>,
}

impl<T> StoreEntry<T> {
    pub(crate) fn new(id: String, created_at: Option<Timestamp>, entity: T) -> Self {
        Self {
            id,
            created_at,
            entity,
            reposted_by: Vec::new(),
        }
    }
}

/// Strategy for converting raw relay events into the caller's entity type.
///
/// Blanket-implemented for closures, so `Arc::new(|event: &Event| ...)` works
/// directly; use [`IdentityConverter`] to keep raw events.
pub trait EventConverter<T>: Send + Sync {
    fn convert(&self, event: &Event) -> T;
}

impl<T, F> EventConverter<T> for F
where
    F: Fn(&Event) -> T + Send + Sync,
{
    fn convert(&self, event: &Event) -> T {
        (self)(event)
    }
}

/// Converter for stores that materialize the raw event unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityConverter;

impl EventConverter<Event> for IdentityConverter {
    fn convert(&self, event: &Event) -> Event {
        event.clone()
    }
}

/// Compute the identity used for deduplication.
///
/// Replaceable and addressable kinds dedup on their coordinate so a newer
/// revision does not produce a second row; everything else dedups on the
/// event id.
pub fn dedup_tag(event: &Event) -> String {
    if event.kind.is_addressable() {
        let identifier = event.tags.identifier().unwrap_or_default();
        format!("{}:{}:{}", event.kind.as_u16(), event.pubkey, identifier)
    } else if event.kind.is_replaceable() {
        format!("{}:{}", event.kind.as_u16(), event.pubkey)
    } else {
        event.id.to_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sign(builder: EventBuilder, keys: &Keys) -> Event {
        builder.sign_with_keys(keys).unwrap()
    }

    #[test]
    fn test_dedup_tag_regular_event_uses_id() {
        let keys = Keys::generate();
        let event = sign(EventBuilder::text_note("hello"), &keys);
        assert_eq!(dedup_tag(&event), event.id.to_hex());
    }

    #[test]
    fn test_dedup_tag_replaceable_event_uses_kind_and_author() {
        let keys = Keys::generate();
        let event = sign(EventBuilder::new(Kind::Metadata, "{}"), &keys);
        assert_eq!(dedup_tag(&event), format!("0:{}", keys.public_key()));
    }

    #[test]
    fn test_dedup_tag_addressable_event_uses_coordinate() {
        let keys = Keys::generate();
        let event = sign(
            EventBuilder::new(Kind::Custom(30023), "article").tags([Tag::identifier("slug")]),
            &keys,
        );
        assert_eq!(
            dedup_tag(&event),
            format!("30023:{}:slug", keys.public_key())
        );
    }

    #[test]
    fn test_addressable_events_with_same_identifier_share_identity() {
        let keys = Keys::generate();
        let first = sign(
            EventBuilder::new(Kind::Custom(30023), "v1").tags([Tag::identifier("slug")]),
            &keys,
        );
        let second = sign(
            EventBuilder::new(Kind::Custom(30023), "v2").tags([Tag::identifier("slug")]),
            &keys,
        );
        assert_ne!(first.id, second.id);
        assert_eq!(dedup_tag(&first), dedup_tag(&second));
    }

    #[test]
    fn test_closure_converter() {
        let keys = Keys::generate();
        let event = sign(EventBuilder::text_note("note body"), &keys);
        let converter: Arc<dyn EventConverter<String>> =
            Arc::new(|event: &Event| event.content.clone());
        assert_eq!(converter.convert(&event), "note body");
    }

    #[test]
    fn test_identity_converter() {
        let keys = Keys::generate();
        let event = sign(EventBuilder::text_note("x"), &keys);
        assert_eq!(IdentityConverter.convert(&event), event);
    }
}
