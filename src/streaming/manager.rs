//! Stream manager for per-room broadcast channels.
//!
//! Streams are created lazily on subscribe and removed on the first emit
//! after every receiver has been dropped. An update identical to the last
//! one a room published is coalesced away.

use dashmap::DashMap;
use tokio::sync::broadcast;

use super::types::MessageUpdate;

const BUFFER_SIZE: usize = 100;

#[derive(Debug)]
struct RoomStream {
    sender: broadcast::Sender<MessageUpdate>,
    last_sent: Option<MessageUpdate>,
}

#[derive(Debug)]
pub struct RoomStreamManager {
    streams: DashMap<String, RoomStream>,
    buffer_size: usize,
}

impl RoomStreamManager {
    pub fn new() -> Self {
        Self::with_buffer_size(BUFFER_SIZE)
    }

    /// Each room's channel holds up to `buffer_size` updates; slower
    /// receivers observe a lag error and skip ahead.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            streams: DashMap::new(),
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn subscribe(&self, room_id: &str) -> broadcast::Receiver<MessageUpdate> {
        self.streams
            .entry(room_id.to_string())
            .or_insert_with(|| RoomStream {
                sender: broadcast::channel(self.buffer_size).0,
                last_sent: None,
            })
            .sender
            .subscribe()
    }

    /// Publishes an update to the subscribers of `update.room_id`.
    ///
    /// Returns `true` when at least one receiver got it. Repeats of the
    /// previous update for the same room are dropped.
    pub fn emit(&self, update: &MessageUpdate) -> bool {
        let Some(mut stream) = self.streams.get_mut(&update.room_id) else {
            return false;
        };

        if stream.last_sent.as_ref() == Some(update) {
            tracing::debug!(
                target: "threadline::streaming",
                "Coalesced repeated update for {} in room {}",
                update.message.id,
                update.room_id
            );
            return false;
        }

        match stream.sender.send(update.clone()) {
            Ok(_) => {
                stream.last_sent = Some(update.clone());
                true
            }
            Err(_) => {
                drop(stream);
                let removed = self
                    .streams
                    .remove_if(&update.room_id, |_, stream| stream.sender.receiver_count() == 0);
                if removed.is_some() {
                    tracing::debug!(
                        target: "threadline::streaming",
                        "Removed stream for room {} with no subscribers",
                        update.room_id
                    );
                }
                false
            }
        }
    }

    pub fn subscriber_count(&self, room_id: &str) -> usize {
        self.streams
            .get(room_id)
            .map_or(0, |stream| stream.sender.receiver_count())
    }

    pub fn has_stream(&self, room_id: &str) -> bool {
        self.streams.contains_key(room_id)
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }
}

impl Default for RoomStreamManager {
    fn default() -> Self {
        Self::new()
    }
}
