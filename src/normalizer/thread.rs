//! Thread folding and caching
//!
//! Folds a room timeline into one [`Thread`] and keeps derived threads in an
//! explicit [`ThreadCache`] owned by the caller.

use chrono::Utc;
use dashmap::DashMap;

use crate::event_store::TimelineLookup;
use crate::types::{Membership, RawEvent, RoomMember, RoomMetadata};

use super::MessageNormalizer;
use super::types::{Message, NormalizeMode, Participant, Thread, ThreadType};

/// Number of member names joined into a fallback group title
const MAX_TITLE_MEMBERS: usize = 5;

/// Builds thread records from room metadata and a timeline
#[derive(Debug, Clone)]
pub struct ThreadNormalizer {
    normalizer: MessageNormalizer,
}

impl ThreadNormalizer {
    pub fn new(normalizer: MessageNormalizer) -> Self {
        Self { normalizer }
    }

    pub fn message_normalizer(&self) -> &MessageNormalizer {
        &self.normalizer
    }

    /// Fold a timeline into a thread.
    ///
    /// Events are normalized in aggregate mode and kept in the given order;
    /// events without output are dropped.
    pub fn normalize<'e>(
        &self,
        room: &RoomMetadata,
        events: impl IntoIterator<Item = &'e RawEvent>,
        lookup: &impl TimelineLookup,
    ) -> Thread {
        let messages: Vec<Message> = events
            .into_iter()
            .filter_map(|event| {
                self.normalizer
                    .normalize(event, lookup, NormalizeMode::Aggregate)
            })
            .collect();

        if self.normalizer.config().enable_debug_logging {
            tracing::debug!(
                target: "threadline::normalizer::thread",
                "Folded {} messages for room {}",
                messages.len(),
                room.room_id
            );
        }

        let last_activity = messages
            .last()
            .map(|message| message.timestamp)
            .unwrap_or_else(Utc::now);

        Thread {
            id: room.room_id.clone(),
            title: self.resolve_title(room),
            img_url: self.resolve_image(room),
            thread_type: if room.is_direct {
                ThreadType::Single
            } else {
                ThreadType::Group
            },
            last_activity,
            messages,
            has_more_older: room.has_more_older,
            participants: self.participants(room),
        }
    }

    /// Fold a timeline and store the result in `cache`.
    pub fn normalize_into<'e>(
        &self,
        cache: &ThreadCache,
        room: &RoomMetadata,
        events: impl IntoIterator<Item = &'e RawEvent>,
        lookup: &impl TimelineLookup,
    ) -> Thread {
        let thread = self.normalize(room, events, lookup);
        cache.insert(thread.clone());
        thread
    }

    /// Resolves the thread title.
    ///
    /// Fallback chain: room name -> DM partner -> member names -> room id
    fn resolve_title(&self, room: &RoomMetadata) -> String {
        if let Some(name) = room.name.as_ref().filter(|name| !name.is_empty()) {
            return name.clone();
        }

        if room.is_direct {
            if let Some(other) = self.dm_other_member(room) {
                return other.name().to_string();
            }
        }

        let names: Vec<&str> = self
            .other_members(room)
            .take(MAX_TITLE_MEMBERS)
            .map(RoomMember::name)
            .collect();
        if !names.is_empty() {
            return names.join(", ");
        }

        room.room_id.clone()
    }

    fn resolve_image(&self, room: &RoomMetadata) -> Option<String> {
        let avatar = room
            .avatar_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .or_else(|| {
                room.is_direct
                    .then(|| self.dm_other_member(room))
                    .flatten()
                    .and_then(|other| other.avatar_url.as_deref())
            })?;
        self.normalizer.resolver().resolve(avatar)
    }

    fn participants(&self, room: &RoomMetadata) -> Vec<Participant> {
        let own_user_id = self.normalizer.own_user_id();
        room.members
            .iter()
            .filter(|member| is_current_member(member))
            .take(self.normalizer.config().max_participants)
            .map(|member| Participant {
                id: member.user_id.clone(),
                full_name: member
                    .display_name
                    .as_ref()
                    .filter(|name| !name.is_empty())
                    .cloned(),
                img_url: member
                    .avatar_url
                    .as_deref()
                    .and_then(|url| self.normalizer.resolver().resolve(url)),
                is_self: member.user_id == own_user_id,
            })
            .collect()
    }

    /// Current members other than the normalizing user.
    fn other_members<'r>(&self, room: &'r RoomMetadata) -> impl Iterator<Item = &'r RoomMember> {
        let own_user_id = self.normalizer.own_user_id().to_string();
        room.members
            .iter()
            .filter(|member| is_current_member(member))
            .filter(move |member| member.user_id != own_user_id)
    }

    /// Finds the other member of a direct room.
    fn dm_other_member<'r>(&self, room: &'r RoomMetadata) -> Option<&'r RoomMember> {
        self.other_members(room).next()
    }
}

fn is_current_member(member: &RoomMember) -> bool {
    matches!(member.membership, Membership::Join | Membership::Invite)
}

/// Derived threads keyed by room id
#[derive(Debug, Default)]
pub struct ThreadCache {
    threads: DashMap<String, Thread>,
}

impl ThreadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, room_id: &str) -> Option<Thread> {
        self.threads.get(room_id).map(|entry| entry.value().clone())
    }

    /// Stores a thread, returning the one it replaced.
    pub fn insert(&self, thread: Thread) -> Option<Thread> {
        self.threads.insert(thread.id.clone(), thread)
    }

    pub fn remove(&self, room_id: &str) -> Option<Thread> {
        self.threads.remove(room_id).map(|(_, thread)| thread)
    }

    /// All cached threads, most recent activity first.
    pub fn threads(&self) -> Vec<Thread> {
        let mut threads: Vec<Thread> = self
            .threads
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        threads.sort_by(|a, b| {
            b.last_activity
                .cmp(&a.last_activity) // Descending (most recent first)
                .then_with(|| a.id.cmp(&b.id))
        });
        threads
    }

    pub fn clear(&self) {
        self.threads.clear();
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}
