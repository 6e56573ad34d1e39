//! Human-readable texts for membership, room and settings events.

use serde_json::Value;

use crate::event_store::TimelineLookup;
use crate::types::RawEvent;

use super::classifier::ContentKind;
use super::types::{ActionDescriptor, ActionType};

/// Text plus the structured descriptor of an action message
#[derive(Debug, Clone, PartialEq)]
pub struct ActionText {
    pub text: String,
    pub action: ActionDescriptor,
}

impl ActionText {
    fn new(text: String, action_type: ActionType, actor: &str) -> Self {
        Self {
            text,
            action: ActionDescriptor {
                action_type,
                actor_participant_id: actor.to_string(),
                participant_ids: Vec::new(),
                title: None,
            },
        }
    }

    fn with_participants(mut self, participant_ids: Vec<String>) -> Self {
        self.action.participant_ids = participant_ids;
        self
    }

    fn with_title(mut self, title: Option<String>) -> Self {
        self.action.title = title;
        self
    }
}

/// Display name of a member, falling back to the user id.
pub fn display_name(user_id: &str, lookup: &impl TimelineLookup) -> String {
    lookup
        .member_display_name(user_id)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| user_id.to_string())
}

/// Describes an action event. Returns `None` for kinds that are not actions
/// and for actions that have nothing to show.
pub fn describe(
    kind: ContentKind,
    event: &RawEvent,
    lookup: &impl TimelineLookup,
) -> Option<ActionText> {
    let sender = display_name(&event.sender, lookup);
    let actor = event.sender.as_str();

    match kind {
        ContentKind::MembershipJoin => Some(
            ActionText::new(
                format!("{sender} joined the room"),
                ActionType::ParticipantsAdded,
                actor,
            )
            .with_participants(vec![membership_subject(event).to_string()]),
        ),
        ContentKind::MembershipLeave => {
            let subject = membership_subject(event);
            let text = if subject == actor {
                format!("{sender} left the room")
            } else {
                format!("{sender} removed {}", display_name(subject, lookup))
            };
            Some(
                ActionText::new(text, ActionType::ParticipantsRemoved, actor)
                    .with_participants(vec![subject.to_string()]),
            )
        }
        ContentKind::MembershipOther => membership_other(event, &sender, lookup),
        ContentKind::RoomRenamed => {
            let previous = event.prev_content_str("name").unwrap_or_default();
            let current = event.content_str("name").unwrap_or_default();
            Some(
                ActionText::new(
                    format!("{sender} changed the room name from {previous} to {current}"),
                    ActionType::TitleUpdated,
                    actor,
                )
                .with_title(Some(current.to_string())),
            )
        }
        ContentKind::RoomCreated => {
            let title = event
                .content_str("name")
                .filter(|name| !name.is_empty())
                .map(str::to_string);
            Some(
                ActionText::new(
                    format!("{sender} created and configured the room"),
                    ActionType::ThreadCreated,
                    actor,
                )
                .with_title(title),
            )
        }
        ContentKind::EncryptionEnabled => Some(ActionText::new(
            "Encryption enabled".to_string(),
            ActionType::EncryptionEnabled,
            actor,
        )),
        ContentKind::GuestAccessChanged => Some(ActionText::new(
            guest_access_text(&sender, event.content_str("guest_access")),
            ActionType::SettingsChanged,
            actor,
        )),
        ContentKind::HistoryVisibilityChanged => Some(ActionText::new(
            history_visibility_text(&sender, event.content_str("history_visibility")),
            ActionType::SettingsChanged,
            actor,
        )),
        ContentKind::JoinRulesChanged => Some(ActionText::new(
            join_rules_text(&sender, event.content_str("join_rule")),
            ActionType::SettingsChanged,
            actor,
        )),
        ContentKind::PowerLevelsChanged => power_levels(event, &sender, lookup),
        _ => None,
    }
}

/// The member a membership event is about.
fn membership_subject(event: &RawEvent) -> &str {
    event
        .state_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .unwrap_or(&event.sender)
}

fn membership_other(
    event: &RawEvent,
    sender: &str,
    lookup: &impl TimelineLookup,
) -> Option<ActionText> {
    let subject = membership_subject(event);
    let target = display_name(subject, lookup);
    let actor = event.sender.as_str();

    let action = match event.content_str("membership")? {
        "invite" => ActionText::new(
            format!("{sender} invited {target}"),
            ActionType::ParticipantInvited,
            actor,
        ),
        "ban" => ActionText::new(
            format!("{sender} banned {target}"),
            ActionType::ParticipantBanned,
            actor,
        ),
        "knock" => ActionText::new(
            format!("{sender} asked to join the room"),
            ActionType::SettingsChanged,
            actor,
        ),
        _ => return None,
    };
    Some(action.with_participants(vec![subject.to_string()]))
}

fn guest_access_text(sender: &str, guest_access: Option<&str>) -> String {
    match guest_access {
        Some("can_join") => format!("{sender} has allowed guests to join the room."),
        Some("forbidden") => format!("{sender} has prevented guests from joining the room."),
        other => format!(
            "{sender} changed guest access to {}",
            other.unwrap_or_default()
        ),
    }
}

fn history_visibility_text(sender: &str, visibility: Option<&str>) -> String {
    match visibility {
        Some("invited") => format!(
            "{sender} made future room history visible to all room members, from the point they are invited."
        ),
        Some("joined") => format!(
            "{sender} made future room history visible to all room members, from the point they joined."
        ),
        Some("shared") => {
            format!("{sender} made future room history visible to all room members.")
        }
        Some("world_readable") => format!("{sender} made future room history visible to anyone."),
        other => format!(
            "{sender} made future room history visible to unknown {}.",
            other.unwrap_or_default()
        ),
    }
}

fn join_rules_text(sender: &str, join_rule: Option<&str>) -> String {
    match join_rule {
        Some("public") => format!("{sender} made the room public to whoever knows the link."),
        Some("invite") => format!("{sender} made the room invite only."),
        Some("knock") => format!("{sender} changed the join rule to ask to join."),
        Some("restricted") => format!("{sender} changed who can join this room."),
        other => format!(
            "{sender} changed the join rule to {}",
            other.unwrap_or_default()
        ),
    }
}

/// Role label for a power level.
pub fn textual_power_level(level: i64, users_default: i64) -> String {
    match level {
        100 => "Admin".to_string(),
        50 => "Moderator".to_string(),
        level if level == users_default => "Default".to_string(),
        0 => "Restricted".to_string(),
        level => format!("Custom {level}"),
    }
}

struct PowerLevelDiff {
    user_id: String,
    from: i64,
    to: i64,
}

fn power_levels(event: &RawEvent, sender: &str, lookup: &impl TimelineLookup) -> Option<ActionText> {
    let previous = event.prev_content()?;
    let previous_users = previous.get("users")?.as_object()?;
    let current_users = event.content.get("users")?.as_object()?;

    let users_default = |content: &Value| {
        content
            .get("users_default")
            .and_then(Value::as_i64)
            .unwrap_or(0)
    };
    let previous_default = users_default(previous);
    let current_default = users_default(&event.content);

    let mut user_ids: Vec<&String> = current_users.keys().collect();
    for user_id in previous_users.keys() {
        if !user_ids.contains(&user_id) {
            user_ids.push(user_id);
        }
    }

    let diffs: Vec<PowerLevelDiff> = user_ids
        .into_iter()
        .filter_map(|user_id| {
            let from = previous_users
                .get(user_id)
                .and_then(Value::as_i64)
                .unwrap_or(previous_default);
            let to = current_users
                .get(user_id)
                .and_then(Value::as_i64)
                .unwrap_or(current_default);
            if from == previous_default && to == current_default {
                return None;
            }
            (from != to).then(|| PowerLevelDiff {
                user_id: user_id.clone(),
                from,
                to,
            })
        })
        .collect();

    if diffs.is_empty() {
        return None;
    }

    let diff_text = diffs
        .iter()
        .map(|diff| {
            format!(
                "{} from {} to {}",
                display_name(&diff.user_id, lookup),
                textual_power_level(diff.from, previous_default),
                textual_power_level(diff.to, current_default)
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    Some(
        ActionText::new(
            format!("{sender} changed the power level of {diff_text}."),
            ActionType::SettingsChanged,
            &event.sender,
        )
        .with_participants(diffs.into_iter().map(|diff| diff.user_id).collect()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::EventArena;
    use crate::normalizer::classifier::classify;
    use serde_json::json;

    fn state_event(kind: &str, state_key: &str, content: Value, prev_content: Option<Value>) -> RawEvent {
        let mut value = json!({
            "event_id": "$state",
            "room_id": "!room:example.org",
            "type": kind,
            "sender": "@alice:example.org",
            "origin_server_ts": 1,
            "state_key": state_key,
            "content": content
        });
        if let Some(prev) = prev_content {
            value["unsigned"] = json!({ "prev_content": prev });
        }
        serde_json::from_value(value).unwrap()
    }

    fn arena_with_names() -> EventArena {
        let mut arena = EventArena::new();
        arena.set_member_display_name("@alice:example.org", "Alice");
        arena.set_member_display_name("@bob:example.org", "Bob");
        arena
    }

    fn text_of(event: &RawEvent, lookup: &EventArena) -> Option<String> {
        describe(classify(event), event, lookup).map(|action| action.text)
    }

    #[test]
    fn test_membership_texts() {
        let arena = arena_with_names();

        let join = state_event("m.room.member", "@alice:example.org", json!({ "membership": "join" }), None);
        let action = describe(classify(&join), &join, &arena).unwrap();
        assert_eq!(action.text, "Alice joined the room");
        assert_eq!(action.action.action_type, ActionType::ParticipantsAdded);
        assert_eq!(action.action.participant_ids, vec!["@alice:example.org"]);

        let leave = state_event("m.room.member", "@alice:example.org", json!({ "membership": "leave" }), None);
        assert_eq!(text_of(&leave, &arena).as_deref(), Some("Alice left the room"));

        let kick = state_event("m.room.member", "@bob:example.org", json!({ "membership": "leave" }), None);
        let action = describe(classify(&kick), &kick, &arena).unwrap();
        assert_eq!(action.text, "Alice removed Bob");
        assert_eq!(action.action.action_type, ActionType::ParticipantsRemoved);
        assert_eq!(action.action.participant_ids, vec!["@bob:example.org"]);

        let invite = state_event("m.room.member", "@bob:example.org", json!({ "membership": "invite" }), None);
        let action = describe(classify(&invite), &invite, &arena).unwrap();
        assert_eq!(action.text, "Alice invited Bob");
        assert_eq!(action.action.action_type, ActionType::ParticipantInvited);

        let ban = state_event("m.room.member", "@carol:example.org", json!({ "membership": "ban" }), None);
        assert_eq!(
            text_of(&ban, &arena).as_deref(),
            Some("Alice banned @carol:example.org")
        );

        let knock = state_event("m.room.member", "@alice:example.org", json!({ "membership": "knock" }), None);
        assert_eq!(
            text_of(&knock, &arena).as_deref(),
            Some("Alice asked to join the room")
        );

        let unknown = state_event("m.room.member", "@alice:example.org", json!({ "membership": "custom" }), None);
        assert_eq!(text_of(&unknown, &arena), None);
    }

    #[test]
    fn test_sender_falls_back_to_user_id() {
        let arena = EventArena::new();
        let join = state_event("m.room.member", "@alice:example.org", json!({ "membership": "join" }), None);
        assert_eq!(
            text_of(&join, &arena).as_deref(),
            Some("@alice:example.org joined the room")
        );
    }

    #[test]
    fn test_room_name_texts() {
        let arena = arena_with_names();

        let renamed = state_event(
            "m.room.name",
            "",
            json!({ "name": "Rust" }),
            Some(json!({ "name": "Matrix" })),
        );
        let action = describe(classify(&renamed), &renamed, &arena).unwrap();
        assert_eq!(action.text, "Alice changed the room name from Matrix to Rust");
        assert_eq!(action.action.action_type, ActionType::TitleUpdated);
        assert_eq!(action.action.title.as_deref(), Some("Rust"));

        let created = state_event("m.room.name", "", json!({ "name": "Rust" }), None);
        let action = describe(classify(&created), &created, &arena).unwrap();
        assert_eq!(action.text, "Alice created and configured the room");
        assert_eq!(action.action.action_type, ActionType::ThreadCreated);
    }

    #[test]
    fn test_encryption_text() {
        let arena = arena_with_names();
        let event = state_event("m.room.encryption", "", json!({ "algorithm": "m.megolm.v1.aes-sha2" }), None);
        assert_eq!(text_of(&event, &arena).as_deref(), Some("Encryption enabled"));
    }

    #[test]
    fn test_settings_texts() {
        let arena = arena_with_names();

        let guests = state_event("m.room.guest_access", "", json!({ "guest_access": "can_join" }), None);
        assert_eq!(
            text_of(&guests, &arena).as_deref(),
            Some("Alice has allowed guests to join the room.")
        );

        let history = state_event(
            "m.room.history_visibility",
            "",
            json!({ "history_visibility": "world_readable" }),
            None,
        );
        assert_eq!(
            text_of(&history, &arena).as_deref(),
            Some("Alice made future room history visible to anyone.")
        );

        let rules = state_event("m.room.join_rules", "", json!({ "join_rule": "invite" }), None);
        assert_eq!(
            text_of(&rules, &arena).as_deref(),
            Some("Alice made the room invite only.")
        );

        let private = state_event("m.room.join_rules", "", json!({ "join_rule": "private" }), None);
        assert_eq!(
            text_of(&private, &arena).as_deref(),
            Some("Alice changed the join rule to private")
        );
    }

    #[test]
    fn test_power_level_diff() {
        let arena = arena_with_names();
        let event = state_event(
            "m.room.power_levels",
            "",
            json!({ "users": { "@alice:example.org": 100, "@bob:example.org": 50 } }),
            Some(json!({ "users": { "@alice:example.org": 100 } })),
        );

        let action = describe(classify(&event), &event, &arena).unwrap();
        assert_eq!(
            action.text,
            "Alice changed the power level of Bob from Default to Moderator."
        );
        assert_eq!(action.action.participant_ids, vec!["@bob:example.org"]);
    }

    #[test]
    fn test_power_levels_without_diff() {
        let arena = arena_with_names();
        let unchanged = state_event(
            "m.room.power_levels",
            "",
            json!({ "users": { "@alice:example.org": 100 } }),
            Some(json!({ "users": { "@alice:example.org": 100 } })),
        );
        assert_eq!(text_of(&unchanged, &arena), None);

        let initial = state_event(
            "m.room.power_levels",
            "",
            json!({ "users": { "@alice:example.org": 100 } }),
            None,
        );
        assert_eq!(text_of(&initial, &arena), None);
    }

    #[test]
    fn test_textual_power_level() {
        assert_eq!(textual_power_level(100, 0), "Admin");
        assert_eq!(textual_power_level(50, 0), "Moderator");
        assert_eq!(textual_power_level(0, 0), "Default");
        assert_eq!(textual_power_level(0, 10), "Restricted");
        assert_eq!(textual_power_level(10, 10), "Default");
        assert_eq!(textual_power_level(75, 0), "Custom 75");
    }

    #[test]
    fn test_non_action_kinds() {
        let arena = arena_with_names();
        let message = state_event("m.room.message", "", json!({ "msgtype": "m.text", "body": "hi" }), None);
        assert_eq!(text_of(&message, &arena), None);
    }
}
