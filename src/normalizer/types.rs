use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical message ready for a presentation layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Protocol event id of the message
    pub id: String,

    /// Room the message belongs to
    pub thread_id: String,

    pub timestamp: DateTime<Utc>,

    pub sender_id: String,

    /// Whether the normalizing user sent this message
    pub is_own_message: bool,

    /// Flattened display text (replacement text if deleted)
    pub text: String,

    /// Formatting ranges over `text`
    pub style_spans: Vec<StyleSpan>,

    pub attachments: Vec<Attachment>,

    /// Live reactions, recomputed on every derivation
    pub reactions: Vec<ReactionSummary>,

    /// Whether this record describes a room action rather than user content
    pub is_action: bool,

    pub action: Option<ActionDescriptor>,

    pub is_deleted: bool,

    /// Id of the message this one replies to
    pub quoted_message_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StyleKind {
    Bold,
    Italic,
    Strikethrough,
    Code,
    /// Preformatted code block
    Pre,
    Link,
}

/// A formatting range over flattened text.
///
/// Offsets count chars (Unicode scalar values), half-open `[from, to)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StyleSpan {
    pub from: usize,
    pub to: usize,
    pub kind: StyleKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_target: Option<String>,

    /// Info string of a fenced code block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_language: Option<String>,
}

impl StyleSpan {
    pub fn new(from: usize, to: usize, kind: StyleKind) -> Self {
        Self {
            from,
            to,
            kind,
            link_target: None,
            code_language: None,
        }
    }

    pub fn link(from: usize, to: usize, target: impl Into<String>) -> Self {
        Self {
            link_target: Some(target.into()),
            ..Self::new(from, to, StyleKind::Link)
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentType {
    Img,
    Audio,
    Video,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub id: String,
    pub attachment_type: AttachmentType,

    /// HTTP-fetchable URL resolved from the content URI
    pub src_url: Option<String>,

    pub mime_type: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub is_gif: bool,
}

/// One live reaction on a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactionSummary {
    /// Id of the annotation event
    pub id: String,

    /// The reaction key, usually an emoji
    pub emoji_key: String,

    /// User who reacted
    pub participant_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    ParticipantsAdded,
    ParticipantsRemoved,
    ParticipantInvited,
    ParticipantBanned,
    TitleUpdated,
    ThreadCreated,
    EncryptionEnabled,
    SettingsChanged,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionDescriptor {
    pub action_type: ActionType,
    pub actor_participant_id: String,

    /// Participants the action applies to
    pub participant_ids: Vec<String>,

    /// New title, for title updates
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThreadType {
    Single,
    Group,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub full_name: Option<String>,
    pub img_url: Option<String>,
    pub is_self: bool,
}

/// Canonical thread summary for a room
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Thread {
    pub id: String,
    pub title: String,
    pub img_url: Option<String>,
    pub thread_type: ThreadType,
    pub last_activity: DateTime<Utc>,

    /// Ordered oldest first
    pub messages: Vec<Message>,

    pub has_more_older: bool,
    pub participants: Vec<Participant>,
}

/// How an event is being normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeMode {
    /// A freshly delivered event: relational events re-derive their target.
    Live,
    /// Folding a whole timeline: relational events contribute nothing, their
    /// targets already reflect them.
    Aggregate,
}

/// Configuration for the message normalizer
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NormalizerConfig {
    /// Whether to normalize emoji (treat skin tone variants as same base emoji)
    pub normalize_emoji: bool,

    /// Whether to enable detailed logging of processing steps
    pub enable_debug_logging: bool,

    /// Whether to extract formatting from message bodies
    pub parse_markup: bool,

    /// Deepest style nesting accepted before falling back to plain text
    pub max_markup_depth: usize,

    /// Upper bound on participants listed per thread
    pub max_participants: usize,
}

pub const DEFAULT_MAX_MARKUP_DEPTH: usize = 32;
pub const DEFAULT_MAX_PARTICIPANTS: usize = 512;

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            normalize_emoji: false,
            enable_debug_logging: false,
            parse_markup: true,
            max_markup_depth: DEFAULT_MAX_MARKUP_DEPTH,
            max_participants: DEFAULT_MAX_PARTICIPANTS,
        }
    }
}
