//! Relation resolution
//!
//! Follows reactions and redactions to the events they point at. Nothing here
//! patches a cached message: callers re-derive the affected message, so the
//! result always reflects the current relation state of the lookup.

use crate::event_store::TimelineLookup;
use crate::types::{RawEvent, event_types};

use super::emoji_utils;
use super::types::{NormalizerConfig, ReactionSummary};

/// What a redaction retracts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RedactionTarget<'a> {
    /// A message or sticker; it is shown as deleted
    Message(&'a RawEvent),
    /// A reaction; its parent message loses that reaction
    Reaction { parent: &'a RawEvent },
    /// The target is unknown, no longer resolvable, or has no deleted form
    Missing,
}

/// Collects the live reactions on a message, ordered by time then id.
pub fn reactions_for(
    message_id: &str,
    lookup: &impl TimelineLookup,
    config: &NormalizerConfig,
) -> Vec<ReactionSummary> {
    let mut annotations = lookup.relations(
        message_id,
        event_types::REL_ANNOTATION,
        event_types::REACTION,
    );
    annotations.sort_by(|a, b| {
        a.origin_server_ts
            .cmp(&b.origin_server_ts)
            .then_with(|| a.event_id.cmp(&b.event_id))
    });

    annotations
        .into_iter()
        .filter(|annotation| !annotation.is_redacted())
        .filter_map(|annotation| {
            let key = annotation.relates_to()?.key?;
            let emoji_key =
                emoji_utils::validate_and_normalize_reaction(key, config.normalize_emoji)?;
            Some(ReactionSummary {
                id: annotation.event_id.clone(),
                emoji_key,
                participant_id: annotation.sender.clone(),
            })
        })
        .collect()
}

/// Returns the message a reaction annotates, when it can be resolved.
pub fn annotated_message<'a>(
    reaction: &RawEvent,
    lookup: &'a impl TimelineLookup,
) -> Option<&'a RawEvent> {
    let target_id = reaction.relates_to()?.event_id?;
    let target = lookup.event(target_id)?;
    if is_relational_event(target) {
        return None;
    }
    Some(target)
}

/// Resolves the event a redaction retracts.
pub fn redaction_target<'a>(
    redaction: &RawEvent,
    lookup: &'a impl TimelineLookup,
) -> RedactionTarget<'a> {
    let Some(target) = redaction.redacts_id().and_then(|id| lookup.event(id)) else {
        return RedactionTarget::Missing;
    };

    match target.kind.as_str() {
        event_types::REACTION => match annotated_message(target, lookup) {
            Some(parent) => RedactionTarget::Reaction { parent },
            None => RedactionTarget::Missing,
        },
        event_types::ROOM_MESSAGE | event_types::STICKER => RedactionTarget::Message(target),
        _ => RedactionTarget::Missing,
    }
}

fn is_relational_event(event: &RawEvent) -> bool {
    event.kind == event_types::REACTION || event.kind == event_types::ROOM_REDACTION
}
