//! Live event pipeline
//!
//! Consumes raw events from a channel, stores them in per-room arenas,
//! normalizes each one against its room's current state and publishes the
//! resulting update to the room's subscribers. One event is fully processed
//! before the next is received.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;

use crate::event_store::{EventArena, TimelineLookup};
use crate::normalizer::{
    ContentKind, Message, MessageNormalizer, NormalizeMode, Thread, ThreadNormalizer, classify,
};
use crate::streaming::{MessageUpdate, RoomStreamManager, RoomSubscription, UpdateTrigger};
use crate::types::{RawEvent, RoomMetadata};

pub struct EventPipeline {
    normalizer: MessageNormalizer,
    arenas: DashMap<String, EventArena>,
    streams: RoomStreamManager,
    max_cached_events: usize,
}

impl EventPipeline {
    pub fn new(normalizer: MessageNormalizer, max_cached_events: usize) -> Self {
        Self {
            normalizer,
            arenas: DashMap::new(),
            streams: RoomStreamManager::new(),
            max_cached_events,
        }
    }

    pub fn streams(&self) -> &RoomStreamManager {
        &self.streams
    }

    /// Start the processing loop in a background task.
    ///
    /// The loop ends when the event channel closes, or after a shutdown signal
    /// once the events already queued have been processed.
    pub fn spawn(
        self: Arc<Self>,
        receiver: Receiver<RawEvent>,
        shutdown: Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.process_events(receiver, shutdown).await;
        })
    }

    async fn process_events(&self, mut receiver: Receiver<RawEvent>, mut shutdown: Receiver<()>) {
        tracing::debug!(
            target: "threadline::pipeline",
            "Starting event processing loop"
        );

        let mut shutting_down = false;

        loop {
            tokio::select! {
                Some(event) = receiver.recv() => {
                    self.process_event(event);
                }
                Some(_) = shutdown.recv(), if !shutting_down => {
                    tracing::info!(
                        target: "threadline::pipeline",
                        "Received shutdown signal, finishing current queue..."
                    );
                    shutting_down = true;
                    // Queued events are still delivered, new sends are rejected
                    receiver.close();
                }
                else => {
                    if shutting_down {
                        tracing::debug!(
                            target: "threadline::pipeline",
                            "Queue flushed, shutting down event pipeline"
                        );
                    } else {
                        tracing::debug!(
                            target: "threadline::pipeline",
                            "All channels closed, exiting event processing loop"
                        );
                    }
                    break;
                }
            }
        }
    }

    /// Store one event and publish the update it causes.
    ///
    /// Returns the published update, or `None` when the event has nothing to
    /// show (unrecognized, duplicate, or pointing at an unknown event).
    pub fn process_event(&self, event: RawEvent) -> Option<MessageUpdate> {
        let kind = classify(&event);
        let event_id = event.event_id.clone();
        let room_id = event.room_id.clone();
        let redacted_id = event.redacts_id().map(str::to_string);

        let message = {
            let mut arena = self
                .arenas
                .entry(room_id.clone())
                .or_insert_with(|| EventArena::with_capacity_limit(self.max_cached_events));

            if !arena.insert(event) {
                tracing::debug!(
                    target: "threadline::pipeline",
                    "Skipping duplicate event {}",
                    event_id
                );
                return None;
            }

            let stored = arena.event(&event_id)?;
            self.normalizer
                .normalize(stored, &*arena, NormalizeMode::Live)
        };

        let Some(message) = message else {
            tracing::debug!(
                target: "threadline::pipeline",
                "Event {} ({:?}) produced no message",
                event_id,
                kind
            );
            return None;
        };

        let trigger = match kind {
            ContentKind::ReactionAnnotation => UpdateTrigger::ReactionAdded,
            ContentKind::Redaction
                if message.is_deleted && redacted_id.as_deref() == Some(message.id.as_str()) =>
            {
                UpdateTrigger::MessageDeleted
            }
            ContentKind::Redaction => UpdateTrigger::ReactionRemoved,
            _ => UpdateTrigger::NewMessage,
        };

        let update = MessageUpdate {
            room_id,
            trigger,
            message,
        };
        self.streams.emit(&update);
        Some(update)
    }

    /// Copy member display names into the room's arena.
    pub fn apply_room_metadata(&self, room: &RoomMetadata) {
        self.arenas
            .entry(room.room_id.clone())
            .or_insert_with(|| EventArena::with_capacity_limit(self.max_cached_events))
            .apply_room_members(room);
    }

    /// Fold the events stored for a room into a thread.
    pub fn thread(&self, room: &RoomMetadata) -> Thread {
        let thread_normalizer = ThreadNormalizer::new(self.normalizer.clone());
        match self.arenas.get(&room.room_id) {
            Some(arena) => thread_normalizer.normalize(room, arena.timeline(), &*arena),
            None => {
                let empty = EventArena::new();
                thread_normalizer.normalize(room, empty.timeline(), &empty)
            }
        }
    }

    /// Subscribe to a room and take a snapshot of its current messages.
    pub fn subscribe(&self, room_id: &str) -> RoomSubscription {
        // Subscribe first so nothing processed during the snapshot is lost
        let updates = self.streams.subscribe(room_id);

        let initial_messages: Vec<Message> = self
            .arenas
            .get(room_id)
            .map(|arena| {
                arena
                    .timeline()
                    .filter_map(|event| {
                        self.normalizer
                            .normalize(event, &*arena, NormalizeMode::Aggregate)
                    })
                    .collect()
            })
            .unwrap_or_default();

        RoomSubscription {
            initial_messages,
            updates,
        }
    }
}
