//! Event Store Module
//!
//! An in-memory arena of raw events keyed by event id. Events never hold
//! references to each other; relations and redactions are resolved through
//! id lookups against the arena, so a redaction or reaction can be resolved
//! without owning its target.

use std::collections::{HashMap, VecDeque};

use crate::types::{RawEvent, RoomMetadata, event_types};

/// Default upper bound on the number of events one arena keeps.
pub const DEFAULT_MAX_EVENTS: usize = 10_000;

/// Read-only view over a room's timeline, used by the normalizer to follow
/// relations between events.
///
/// All lookups made during one normalization call go through the same
/// borrowed view, so they observe a single consistent state.
pub trait TimelineLookup {
    /// Returns the event with the given id if it is still resolvable.
    fn event(&self, event_id: &str) -> Option<&RawEvent>;

    /// Returns the live (not redacted) events of `event_kind` that relate to
    /// `event_id` with the given `rel_type`.
    fn relations(&self, event_id: &str, rel_type: &str, event_kind: &str) -> Vec<&RawEvent>;

    /// Display name of a room member, when known.
    fn member_display_name(&self, _user_id: &str) -> Option<String> {
        None
    }
}

/// Arena of events for a single room.
#[derive(Debug, Clone)]
pub struct EventArena {
    events: HashMap<String, RawEvent>,
    /// Arrival order, oldest first
    order: VecDeque<String>,
    /// Target event id -> ids of events relating to it
    relations: HashMap<String, Vec<String>>,
    /// Target event id -> redaction id, for redactions seen before their target
    pending_redactions: HashMap<String, String>,
    display_names: HashMap<String, String>,
    max_events: usize,
}

impl EventArena {
    pub fn new() -> Self {
        Self::with_capacity_limit(DEFAULT_MAX_EVENTS)
    }

    pub fn with_capacity_limit(max_events: usize) -> Self {
        Self {
            events: HashMap::new(),
            order: VecDeque::new(),
            relations: HashMap::new(),
            pending_redactions: HashMap::new(),
            display_names: HashMap::new(),
            max_events: max_events.max(1),
        }
    }

    /// Builds an arena from a timeline, inserting events in the given order.
    pub fn from_events(events: impl IntoIterator<Item = RawEvent>) -> Self {
        let mut arena = Self::new();
        for event in events {
            arena.insert(event);
        }
        arena
    }

    /// Inserts an event, keeping the relation index and redaction flags up to
    /// date. Returns `false` when an event with the same id is already stored.
    pub fn insert(&mut self, mut event: RawEvent) -> bool {
        if self.events.contains_key(&event.event_id) {
            return false;
        }

        if event.kind == event_types::ROOM_REDACTION {
            if let Some(target_id) = event.redacts_id().map(str::to_string) {
                self.apply_redaction(&target_id, &event.event_id);
            }
        }

        if let Some(redaction_id) = self.pending_redactions.remove(&event.event_id) {
            if event.unsigned.redacted_because.is_none() {
                event.unsigned.redacted_because = Some(redaction_id);
            }
        }

        if let Some(target_id) = event.relates_to().and_then(|relation| relation.event_id) {
            self.relations
                .entry(target_id.to_string())
                .or_default()
                .push(event.event_id.clone());
        }

        self.order.push_back(event.event_id.clone());
        self.events.insert(event.event_id.clone(), event);
        self.evict_overflow();
        true
    }

    fn apply_redaction(&mut self, target_id: &str, redaction_id: &str) {
        match self.events.get_mut(target_id) {
            Some(target) => {
                if target.unsigned.redacted_because.is_none() {
                    target.unsigned.redacted_because = Some(redaction_id.to_string());
                }
            }
            None if self.pending_redactions.len() < self.max_events => {
                self.pending_redactions
                    .insert(target_id.to_string(), redaction_id.to_string());
            }
            None => {
                tracing::debug!(
                    target: "threadline::event_store",
                    "Dropping redaction {} of unseen event {}: pending set is full",
                    redaction_id,
                    target_id
                );
            }
        }
    }

    fn evict_overflow(&mut self) {
        while self.events.len() > self.max_events {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            let Some(evicted) = self.events.remove(&oldest) else {
                continue;
            };
            self.forget_links(&evicted);
            tracing::debug!(
                target: "threadline::event_store",
                "Evicted event {} (capacity {})",
                oldest,
                self.max_events
            );
        }
    }

    /// Drops the index entries an evicted event owns. Every relation entry
    /// and pending redaction belongs to a stored event, so both indexes stay
    /// within the capacity limit.
    fn forget_links(&mut self, evicted: &RawEvent) {
        if let Some(target_id) = evicted.relates_to().and_then(|relation| relation.event_id) {
            if let Some(ids) = self.relations.get_mut(target_id) {
                ids.retain(|id| *id != evicted.event_id);
                if ids.is_empty() {
                    self.relations.remove(target_id);
                }
            }
        }

        if let Some(target_id) = evicted.redacts_id() {
            if self
                .pending_redactions
                .get(target_id)
                .is_some_and(|redaction_id| *redaction_id == evicted.event_id)
            {
                self.pending_redactions.remove(target_id);
            }
        }
    }

    pub fn set_member_display_name(&mut self, user_id: impl Into<String>, name: impl Into<String>) {
        self.display_names.insert(user_id.into(), name.into());
    }

    /// Copies member display names from room metadata.
    pub fn apply_room_members(&mut self, room: &RoomMetadata) {
        for member in &room.members {
            if let Some(name) = member.display_name.as_ref().filter(|n| !n.is_empty()) {
                self.display_names
                    .insert(member.user_id.clone(), name.clone());
            }
        }
    }

    /// Events in arrival order, oldest first.
    pub fn timeline(&self) -> impl Iterator<Item = &RawEvent> {
        self.order.iter().filter_map(|id| self.events.get(id))
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.events.contains_key(event_id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for EventArena {
    fn default() -> Self {
        Self::new()
    }
}

impl TimelineLookup for EventArena {
    fn event(&self, event_id: &str) -> Option<&RawEvent> {
        self.events.get(event_id)
    }

    fn relations(&self, event_id: &str, rel_type: &str, event_kind: &str) -> Vec<&RawEvent> {
        let Some(ids) = self.relations.get(event_id) else {
            return Vec::new();
        };

        ids.iter()
            .filter_map(|id| self.events.get(id))
            .filter(|event| event.kind == event_kind && !event.is_redacted())
            .filter(|event| {
                event
                    .relates_to()
                    .is_some_and(|relation| relation.rel_type == Some(rel_type))
            })
            .collect()
    }

    fn member_display_name(&self, user_id: &str) -> Option<String> {
        self.display_names.get(user_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Membership, RoomMember};
    use serde_json::json;

    fn message(id: &str, ts: i64) -> RawEvent {
        serde_json::from_value(json!({
            "event_id": id,
            "room_id": "!room:example.org",
            "type": "m.room.message",
            "sender": "@alice:example.org",
            "origin_server_ts": ts,
            "content": { "msgtype": "m.text", "body": "hello" }
        }))
        .unwrap()
    }

    fn reaction(id: &str, target: &str, key: &str) -> RawEvent {
        serde_json::from_value(json!({
            "event_id": id,
            "room_id": "!room:example.org",
            "type": "m.reaction",
            "sender": "@bob:example.org",
            "origin_server_ts": 10,
            "content": {
                "m.relates_to": { "rel_type": "m.annotation", "event_id": target, "key": key }
            }
        }))
        .unwrap()
    }

    fn redaction(id: &str, target: &str) -> RawEvent {
        serde_json::from_value(json!({
            "event_id": id,
            "room_id": "!room:example.org",
            "type": "m.room.redaction",
            "sender": "@bob:example.org",
            "origin_server_ts": 20,
            "redacts": target,
            "content": {}
        }))
        .unwrap()
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut arena = EventArena::new();
        assert!(arena.insert(message("$m1", 1)));
        assert!(!arena.insert(message("$m1", 1)));

        assert_eq!(arena.len(), 1);
        assert!(arena.event("$m1").is_some());
        assert!(arena.event("$missing").is_none());
    }

    #[test]
    fn test_timeline_preserves_arrival_order() {
        let arena = EventArena::from_events(vec![message("$b", 2), message("$a", 1)]);
        let ids: Vec<&str> = arena.timeline().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["$b", "$a"]);
    }

    #[test]
    fn test_relations_index() {
        let mut arena = EventArena::new();
        arena.insert(message("$m1", 1));
        arena.insert(reaction("$r1", "$m1", "👍"));
        arena.insert(reaction("$r2", "$m1", "🎉"));

        let related = arena.relations("$m1", "m.annotation", "m.reaction");
        assert_eq!(related.len(), 2);
        assert!(arena.relations("$m1", "m.replace", "m.room.message").is_empty());
    }

    #[test]
    fn test_redaction_marks_target() {
        let mut arena = EventArena::new();
        arena.insert(message("$m1", 1));
        arena.insert(reaction("$r1", "$m1", "👍"));
        arena.insert(redaction("$x", "$r1"));

        assert_eq!(arena.event("$r1").unwrap().redacted_by(), Some("$x"));
        assert!(arena.relations("$m1", "m.annotation", "m.reaction").is_empty());
    }

    #[test]
    fn test_redaction_before_target_is_applied_on_arrival() {
        let mut arena = EventArena::new();
        arena.insert(redaction("$x", "$m1"));
        arena.insert(message("$m1", 1));

        assert_eq!(arena.event("$m1").unwrap().redacted_by(), Some("$x"));
    }

    #[test]
    fn test_eviction_drops_oldest() {
        let mut arena = EventArena::with_capacity_limit(2);
        arena.insert(message("$m1", 1));
        arena.insert(message("$m2", 2));
        arena.insert(message("$m3", 3));

        assert_eq!(arena.len(), 2);
        assert!(!arena.contains("$m1"));
        assert!(arena.contains("$m3"));
        let ids: Vec<&str> = arena.timeline().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["$m2", "$m3"]);
    }

    #[test]
    fn test_eviction_keeps_indexes_bounded() {
        let mut arena = EventArena::with_capacity_limit(10);
        for i in 0..1_000 {
            arena.insert(reaction(&format!("$r{i}"), &format!("$unseen{i}"), "👍"));
            arena.insert(redaction(&format!("$x{i}"), &format!("$gone{i}")));
        }

        assert_eq!(arena.len(), 10);
        assert_eq!(arena.relations.len(), 5);
        assert_eq!(arena.pending_redactions.len(), 5);
    }

    #[test]
    fn test_eviction_unlinks_relating_event() {
        let mut arena = EventArena::with_capacity_limit(3);
        arena.insert(reaction("$r1", "$m", "👍"));
        arena.insert(message("$m", 1));
        arena.insert(reaction("$r2", "$m", "🎉"));
        arena.insert(message("$n", 2));

        assert!(!arena.contains("$r1"));
        assert_eq!(arena.relations.get("$m"), Some(&vec!["$r2".to_string()]));
        assert_eq!(arena.relations("$m", "m.annotation", "m.reaction").len(), 1);
    }

    #[test]
    fn test_member_display_names() {
        let mut arena = EventArena::new();
        arena.apply_room_members(&RoomMetadata {
            room_id: "!room:example.org".to_string(),
            name: None,
            avatar_url: None,
            is_direct: false,
            has_more_older: false,
            members: vec![
                RoomMember {
                    user_id: "@alice:example.org".to_string(),
                    display_name: Some("Alice".to_string()),
                    avatar_url: None,
                    membership: Membership::Join,
                },
                RoomMember {
                    user_id: "@bob:example.org".to_string(),
                    display_name: Some(String::new()),
                    avatar_url: None,
                    membership: Membership::Join,
                },
            ],
        });

        assert_eq!(
            arena.member_display_name("@alice:example.org"),
            Some("Alice".to_string())
        );
        assert_eq!(arena.member_display_name("@bob:example.org"), None);
    }
}
