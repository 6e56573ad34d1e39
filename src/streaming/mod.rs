//! Message Streaming Module
//!
//! Real-time message updates per room. Subscribers receive the complete,
//! freshly derived state of every message affected by an incoming event.

mod manager;
mod types;

pub use manager::RoomStreamManager;
pub use types::{MessageUpdate, RoomSubscription, UpdateTrigger};
