//! Types for the message streaming feature.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::normalizer::Message;

/// What triggered a message update.
///
/// The accompanying `message` field in [`MessageUpdate`] always contains
/// the complete, up-to-date state of the affected message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateTrigger {
    /// A new message or room action arrived.
    NewMessage,

    /// A reaction was added to this message.
    ReactionAdded,

    /// A reaction on this message was redacted.
    ReactionRemoved,

    /// The message itself was redacted.
    MessageDeleted,
}

/// A single update sent to subscribers.
///
/// `message` is always the affected standalone message, never the reaction
/// or redaction that caused the update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageUpdate {
    pub room_id: String,

    /// What triggered this update.
    pub trigger: UpdateTrigger,

    /// The complete, current state of the affected message.
    pub message: Message,
}

/// Result of subscribing to a room.
///
/// The receiver is created before the snapshot is taken, so no update is
/// missed; an update may repeat a message already in the snapshot.
pub struct RoomSubscription {
    /// Current messages of the room at subscription time.
    pub initial_messages: Vec<Message>,

    /// Receiver for real-time updates after the snapshot.
    pub updates: broadcast::Receiver<MessageUpdate>,
}
