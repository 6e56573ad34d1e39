//! Content classification
//!
//! Maps a raw event onto the closed set of content kinds the normalizer knows
//! how to render. Anything outside that set is `Unrecognized`, never an error,
//! so protocol extensions pass through silently.

use serde::{Deserialize, Serialize};

use crate::types::{RawEvent, event_types};

use super::media::MediaSubtype;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentKind {
    PlainText,
    Notice,
    QuotedReply,
    MediaAttachment(MediaSubtype),
    MembershipJoin,
    MembershipLeave,
    MembershipOther,
    RoomRenamed,
    RoomCreated,
    EncryptionEnabled,
    GuestAccessChanged,
    HistoryVisibilityChanged,
    JoinRulesChanged,
    PowerLevelsChanged,
    ReactionAnnotation,
    Redaction,
    Unrecognized,
}

impl ContentKind {
    /// Kinds that point at another event instead of standing alone.
    pub fn is_relational(self) -> bool {
        matches!(self, ContentKind::ReactionAnnotation | ContentKind::Redaction)
    }
}

/// Classifies an event by its declared type and content subtype.
pub fn classify(event: &RawEvent) -> ContentKind {
    match event.kind.as_str() {
        event_types::ROOM_MESSAGE => classify_message(event),
        event_types::STICKER => ContentKind::MediaAttachment(MediaSubtype::Img),
        event_types::ROOM_MEMBER => match event.content_str("membership") {
            Some("join") => ContentKind::MembershipJoin,
            Some("leave") => ContentKind::MembershipLeave,
            Some(_) => ContentKind::MembershipOther,
            None => ContentKind::Unrecognized,
        },
        event_types::ROOM_NAME => {
            let had_name = event
                .prev_content_str("name")
                .is_some_and(|name| !name.is_empty());
            if had_name {
                ContentKind::RoomRenamed
            } else {
                ContentKind::RoomCreated
            }
        }
        event_types::ROOM_ENCRYPTION => ContentKind::EncryptionEnabled,
        event_types::ROOM_GUEST_ACCESS => ContentKind::GuestAccessChanged,
        event_types::ROOM_HISTORY_VISIBILITY => ContentKind::HistoryVisibilityChanged,
        event_types::ROOM_JOIN_RULES => ContentKind::JoinRulesChanged,
        event_types::ROOM_POWER_LEVELS => ContentKind::PowerLevelsChanged,
        event_types::REACTION => {
            let is_annotation = event.relates_to().is_some_and(|relation| {
                relation.rel_type == Some(event_types::REL_ANNOTATION)
                    && relation.event_id.is_some()
            });
            if is_annotation {
                ContentKind::ReactionAnnotation
            } else {
                ContentKind::Unrecognized
            }
        }
        event_types::ROOM_REDACTION => ContentKind::Redaction,
        _ => ContentKind::Unrecognized,
    }
}

fn classify_message(event: &RawEvent) -> ContentKind {
    match event.content_str("msgtype") {
        Some("m.text") | Some("m.emote") => {
            if event.in_reply_to().is_some() {
                ContentKind::QuotedReply
            } else {
                ContentKind::PlainText
            }
        }
        Some("m.notice") => ContentKind::Notice,
        Some(msgtype @ ("m.image" | "m.audio" | "m.video" | "m.file")) => {
            let subtype = event
                .content
                .get("info")
                .and_then(|info| info.get("mimetype"))
                .and_then(|mime| mime.as_str())
                .map(MediaSubtype::from_mime)
                .unwrap_or_else(|| MediaSubtype::from_msgtype(msgtype));
            ContentKind::MediaAttachment(subtype)
        }
        _ => ContentKind::Unrecognized,
    }
}
