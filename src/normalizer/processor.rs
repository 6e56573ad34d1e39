//! Core message normalization logic
//!
//! Turns one raw event into at most one canonical message. Relational events
//! (reactions, redactions) never produce a record of their own; in live mode
//! they re-derive the message they point at.

use crate::event_store::TimelineLookup;
use crate::types::{RawEvent, event_types};

use super::action_text::{self, display_name};
use super::classifier::{ContentKind, classify};
use super::markup::extract_markup;
use super::media::{MediaUrlResolver, build_attachment};
use super::relations::{self, RedactionTarget};
use super::reply::strip_quote;
use super::types::{Message, NormalizeMode, NormalizerConfig, StyleSpan};

const MARKUP_TRIGGERS: [char; 6] = ['*', '_', '~', '`', '[', '<'];
const UNKNOWN_REDACTOR: &str = "Someone";
const EMOTE_MSGTYPE: &str = "m.emote";

/// Everything a normalization call needs besides the event and the lookup
#[derive(Clone, Copy)]
pub struct NormalizeContext<'a> {
    pub own_user_id: &'a str,
    pub config: &'a NormalizerConfig,
    pub resolver: &'a dyn MediaUrlResolver,
}

/// Normalizes one event against the current relation state of `lookup`.
pub fn normalize_event(
    event: &RawEvent,
    lookup: &impl TimelineLookup,
    mode: NormalizeMode,
    ctx: &NormalizeContext<'_>,
) -> Option<Message> {
    let kind = classify(event);

    if ctx.config.enable_debug_logging {
        tracing::debug!(
            target: "threadline::normalizer::processor",
            "Normalizing {} ({}) as {:?} in {:?} mode",
            event.event_id,
            event.kind,
            kind,
            mode
        );
    }

    // Redacted content is usually stripped, so it cannot be classified
    if is_redacted_message(event) {
        return Some(redacted_message(event, lookup, ctx));
    }

    match (kind, mode) {
        (ContentKind::Unrecognized, _) => None,
        (ContentKind::ReactionAnnotation | ContentKind::Redaction, NormalizeMode::Aggregate) => {
            None
        }
        (ContentKind::ReactionAnnotation, NormalizeMode::Live) => {
            let Some(parent) = relations::annotated_message(event, lookup) else {
                tracing::debug!(
                    target: "threadline::normalizer::processor",
                    "Reaction {} points at an unknown message",
                    event.event_id
                );
                return None;
            };
            derive_message(parent, lookup, ctx)
        }
        (ContentKind::Redaction, NormalizeMode::Live) => {
            match relations::redaction_target(event, lookup) {
                RedactionTarget::Message(target) => derive_message(target, lookup, ctx),
                RedactionTarget::Reaction { parent } => derive_message(parent, lookup, ctx),
                RedactionTarget::Missing => {
                    tracing::debug!(
                        target: "threadline::normalizer::processor",
                        "Redaction {} has no resolvable target",
                        event.event_id
                    );
                    None
                }
            }
        }
        _ => derive_message(event, lookup, ctx),
    }
}

/// Derives the record of a standalone event from scratch.
fn derive_message(
    event: &RawEvent,
    lookup: &impl TimelineLookup,
    ctx: &NormalizeContext<'_>,
) -> Option<Message> {
    if is_redacted_message(event) {
        return Some(redacted_message(event, lookup, ctx));
    }

    let kind = classify(event);
    let mut message = base_message(event, lookup, ctx);

    match kind {
        ContentKind::PlainText | ContentKind::Notice | ContentKind::QuotedReply => {
            let body = event.content_str("body").unwrap_or_default();
            let body = match event.in_reply_to() {
                Some(quoted_id) => {
                    message.quoted_message_id = Some(quoted_id.to_string());
                    if lookup.event(quoted_id).is_some() {
                        strip_quote(body)
                    } else {
                        body
                    }
                }
                None => body,
            };
            let (text, spans) = render_text(event, body, ctx.config);
            if event.content_str("msgtype") == Some(EMOTE_MSGTYPE) {
                let prefix = format!("* {} ", display_name(&event.sender, lookup));
                let shift = prefix.chars().count();
                message.text = prefix + &text;
                message.style_spans = spans
                    .into_iter()
                    .map(|mut span| {
                        span.from += shift;
                        span.to += shift;
                        span
                    })
                    .collect();
            } else {
                message.text = text;
                message.style_spans = spans;
            }
        }
        ContentKind::MediaAttachment(subtype) => {
            message
                .attachments
                .push(build_attachment(event, subtype, ctx.resolver));
        }
        ContentKind::Unrecognized
        | ContentKind::ReactionAnnotation
        | ContentKind::Redaction => return None,
        action_kind => {
            let described = action_text::describe(action_kind, event, lookup)?;
            message.text = described.text;
            message.is_action = true;
            message.action = Some(described.action);
        }
    }

    Some(message)
}

/// The deleted form, attributed to the sender of the recorded redaction.
fn redacted_message(
    event: &RawEvent,
    lookup: &impl TimelineLookup,
    ctx: &NormalizeContext<'_>,
) -> Message {
    let redactor = event
        .redacted_by()
        .and_then(|redaction_id| lookup.event(redaction_id))
        .map(|redaction| display_name(&redaction.sender, lookup))
        .unwrap_or_else(|| UNKNOWN_REDACTOR.to_string());

    let mut message = base_message(event, lookup, ctx);
    message.text = format!("Message deleted by {redactor}");
    message.is_deleted = true;
    message.quoted_message_id = event.in_reply_to().map(str::to_string);
    message
}

fn base_message(
    event: &RawEvent,
    lookup: &impl TimelineLookup,
    ctx: &NormalizeContext<'_>,
) -> Message {
    Message {
        id: event.event_id.clone(),
        thread_id: event.room_id.clone(),
        timestamp: event.timestamp(),
        sender_id: event.sender.clone(),
        is_own_message: event.sender == ctx.own_user_id,
        text: String::new(),
        style_spans: Vec::new(),
        attachments: Vec::new(),
        reactions: relations::reactions_for(&event.event_id, lookup, ctx.config),
        is_action: false,
        action: None,
        is_deleted: false,
        quoted_message_id: None,
    }
}

/// Display text and spans for a text body. Formatting is used only when the
/// extractor actually found some.
fn render_text(event: &RawEvent, body: &str, config: &NormalizerConfig) -> (String, Vec<StyleSpan>) {
    let wants_markup = config.parse_markup
        && (event.content.get("format").is_some() || body.contains(MARKUP_TRIGGERS));

    if wants_markup {
        if let Some(extracted) = extract_markup(body, config.max_markup_depth) {
            if !extracted.spans.is_empty() {
                return (extracted.text, extracted.spans);
            }
        }
    }

    (body.to_string(), Vec::new())
}

fn is_redacted_message(event: &RawEvent) -> bool {
    event.is_redacted()
        && (event.kind == event_types::ROOM_MESSAGE || event.kind == event_types::STICKER)
}
