use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Result, ThreadlineError};

/// Event type strings understood by the classifier.
pub mod event_types {
    pub const ROOM_MESSAGE: &str = "m.room.message";
    pub const STICKER: &str = "m.sticker";
    pub const ROOM_MEMBER: &str = "m.room.member";
    pub const ROOM_NAME: &str = "m.room.name";
    pub const ROOM_ENCRYPTION: &str = "m.room.encryption";
    pub const ROOM_GUEST_ACCESS: &str = "m.room.guest_access";
    pub const ROOM_HISTORY_VISIBILITY: &str = "m.room.history_visibility";
    pub const ROOM_JOIN_RULES: &str = "m.room.join_rules";
    pub const ROOM_POWER_LEVELS: &str = "m.room.power_levels";
    pub const REACTION: &str = "m.reaction";
    pub const ROOM_REDACTION: &str = "m.room.redaction";

    pub const REL_ANNOTATION: &str = "m.annotation";
}

/// A protocol event as delivered by the transport.
///
/// Mirrors the client-server JSON shape, so a synced timeline can be
/// deserialized straight into this type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawEvent {
    pub event_id: String,

    #[serde(default)]
    pub room_id: String,

    /// Declared event type, e.g. `m.room.message`
    #[serde(rename = "type")]
    pub kind: String,

    pub sender: String,

    /// Milliseconds since the unix epoch
    pub origin_server_ts: i64,

    #[serde(default)]
    pub content: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,

    /// Target of a redaction in room versions that keep it at the top level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacts: Option<String>,

    #[serde(default)]
    pub unsigned: Unsigned,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Unsigned {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_content: Option<Value>,

    /// Id of the redaction event that retracted this event.
    /// Accepts either a bare id or the full redaction event object.
    #[serde(
        default,
        deserialize_with = "deserialize_redaction_ref",
        skip_serializing_if = "Option::is_none"
    )]
    pub redacted_because: Option<String>,
}

fn deserialize_redaction_ref<'de, D>(deserializer: D) -> core::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(id)) => Some(id),
        Some(Value::Object(map)) => map
            .get("event_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    })
}

/// The `m.relates_to` block of an event's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelatesTo<'a> {
    pub rel_type: Option<&'a str>,
    pub event_id: Option<&'a str>,
    pub key: Option<&'a str>,
    pub in_reply_to: Option<&'a str>,
}

impl RawEvent {
    /// Parses a single event from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self> {
        let event: RawEvent = serde_json::from_str(json)?;
        if event.event_id.is_empty() {
            return Err(ThreadlineError::InvalidEvent(
                "event_id must not be empty".to_string(),
            ));
        }
        Ok(event)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.origin_server_ts).unwrap_or_default()
    }

    pub fn is_redacted(&self) -> bool {
        self.unsigned.redacted_because.is_some()
    }

    pub fn redacted_by(&self) -> Option<&str> {
        self.unsigned.redacted_because.as_deref()
    }

    /// The event a redaction retracts, from either the top level or the content.
    pub fn redacts_id(&self) -> Option<&str> {
        self.redacts
            .as_deref()
            .or_else(|| self.content_str("redacts"))
    }

    pub fn content_str(&self, key: &str) -> Option<&str> {
        self.content.get(key).and_then(Value::as_str)
    }

    pub fn prev_content(&self) -> Option<&Value> {
        self.unsigned.prev_content.as_ref()
    }

    pub fn prev_content_str(&self, key: &str) -> Option<&str> {
        self.prev_content()
            .and_then(|prev| prev.get(key))
            .and_then(Value::as_str)
    }

    pub fn relates_to(&self) -> Option<RelatesTo<'_>> {
        let relation = self.content.get("m.relates_to")?;
        Some(RelatesTo {
            rel_type: relation.get("rel_type").and_then(Value::as_str),
            event_id: relation.get("event_id").and_then(Value::as_str),
            key: relation.get("key").and_then(Value::as_str),
            in_reply_to: relation
                .get("m.in_reply_to")
                .and_then(|reply| reply.get("event_id"))
                .and_then(Value::as_str),
        })
    }

    pub fn in_reply_to(&self) -> Option<&str> {
        self.relates_to().and_then(|relation| relation.in_reply_to)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Membership {
    Join,
    Invite,
    Leave,
    Ban,
    Knock,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomMember {
    pub user_id: String,

    #[serde(default)]
    pub display_name: Option<String>,

    /// `mxc://` reference to the member's avatar
    #[serde(default)]
    pub avatar_url: Option<String>,

    #[serde(default)]
    pub membership: Membership,
}

impl RoomMember {
    /// Display name when set and non-empty, otherwise the user id.
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.user_id)
    }
}

/// Room state the thread fold needs besides the timeline itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomMetadata {
    pub room_id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub avatar_url: Option<String>,

    #[serde(default)]
    pub is_direct: bool,

    /// Whether the transport reports history before the oldest loaded event
    #[serde(default)]
    pub has_more_older: bool,

    #[serde(default)]
    pub members: Vec<RoomMember>,
}

impl RoomMetadata {
    pub fn member(&self, user_id: &str) -> Option<&RoomMember> {
        self.members.iter().find(|member| member.user_id == user_id)
    }
}

/// A serialized room: metadata plus its loaded timeline, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDump {
    pub room: RoomMetadata,

    #[serde(default)]
    pub events: Vec<RawEvent>,
}

impl RoomDump {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut dump: RoomDump = serde_json::from_str(&raw)?;
        // Sync-format timelines leave the room implicit
        for event in dump.events.iter_mut().filter(|e| e.room_id.is_empty()) {
            event.room_id = dump.room.room_id.clone();
        }
        Ok(dump)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_event_with_redaction_object() {
        let event: RawEvent = serde_json::from_value(json!({
            "event_id": "$msg",
            "room_id": "!room:example.org",
            "type": "m.room.message",
            "sender": "@alice:example.org",
            "origin_server_ts": 1_700_000_000_000i64,
            "content": {},
            "unsigned": {
                "redacted_because": { "event_id": "$redaction", "type": "m.room.redaction" }
            }
        }))
        .unwrap();

        assert!(event.is_redacted());
        assert_eq!(event.redacted_by(), Some("$redaction"));
    }

    #[test]
    fn test_parse_event_with_redaction_id() {
        let event: RawEvent = serde_json::from_value(json!({
            "event_id": "$msg",
            "type": "m.room.message",
            "sender": "@alice:example.org",
            "origin_server_ts": 0,
            "unsigned": { "redacted_because": "$redaction" }
        }))
        .unwrap();

        assert_eq!(event.redacted_by(), Some("$redaction"));
        assert_eq!(event.content, Value::Null);
    }

    #[test]
    fn test_from_json_rejects_empty_event_id() {
        let result = RawEvent::from_json(
            r#"{"event_id":"","type":"m.room.message","sender":"@a:b","origin_server_ts":0}"#,
        );
        assert!(matches!(result, Err(ThreadlineError::InvalidEvent(_))));
    }

    #[test]
    fn test_from_json_reports_malformed_json() {
        let result = RawEvent::from_json("{not json");
        assert!(matches!(result, Err(ThreadlineError::SerializationError(_))));
    }

    #[test]
    fn test_redacts_id_prefers_top_level() {
        let mut event: RawEvent = serde_json::from_value(json!({
            "event_id": "$r",
            "type": "m.room.redaction",
            "sender": "@a:b",
            "origin_server_ts": 0,
            "content": { "redacts": "$from_content" }
        }))
        .unwrap();
        assert_eq!(event.redacts_id(), Some("$from_content"));

        event.redacts = Some("$top".to_string());
        assert_eq!(event.redacts_id(), Some("$top"));
    }

    #[test]
    fn test_relates_to_parsing() {
        let event: RawEvent = serde_json::from_value(json!({
            "event_id": "$reply",
            "type": "m.room.message",
            "sender": "@a:b",
            "origin_server_ts": 0,
            "content": {
                "msgtype": "m.text",
                "body": "hi",
                "m.relates_to": { "m.in_reply_to": { "event_id": "$parent" } }
            }
        }))
        .unwrap();

        assert_eq!(event.in_reply_to(), Some("$parent"));
        assert_eq!(event.relates_to().unwrap().rel_type, None);
    }

    #[test]
    fn test_timestamp_conversion() {
        let event: RawEvent = serde_json::from_value(json!({
            "event_id": "$e",
            "type": "m.room.message",
            "sender": "@a:b",
            "origin_server_ts": 1_000
        }))
        .unwrap();
        assert_eq!(event.timestamp().timestamp_millis(), 1_000);
    }

    #[test]
    fn test_membership_unknown_value() {
        let member: RoomMember = serde_json::from_value(json!({
            "user_id": "@a:b",
            "membership": "something_new"
        }))
        .unwrap();
        assert_eq!(member.membership, Membership::Unknown);
        assert_eq!(member.name(), "@a:b");
    }

    #[test]
    fn test_room_dump_from_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("room.json");
        std::fs::write(
            &path,
            json!({
                "room": { "room_id": "!r:b", "members": [] },
                "events": [{
                    "event_id": "$e",
                    "type": "m.room.message",
                    "sender": "@a:b",
                    "origin_server_ts": 1
                }]
            })
            .to_string(),
        )
        .unwrap();

        let dump = RoomDump::from_path(&path).unwrap();
        assert_eq!(dump.room.room_id, "!r:b");
        assert_eq!(dump.events.len(), 1);
        assert_eq!(dump.events[0].room_id, "!r:b");
    }
}
