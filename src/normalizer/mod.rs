//! Message Normalization Module
//!
//! Turns raw room events into canonical `Message` and `Thread` records for a
//! presentation layer. Normalization is a pure function of the event and the
//! relation state visible through a [`TimelineLookup`]: reactions and
//! redactions are never patched into earlier output, the affected message is
//! derived again instead.

pub mod action_text;
pub mod classifier;
pub mod emoji_utils;
pub mod markup;
pub mod media;
mod processor;
pub mod relations;
pub mod reply;
pub mod thread;
mod types;


pub use classifier::{ContentKind, classify};
pub use emoji_utils::{SUPPORTED_REACTIONS, SupportedReaction, supported_reaction_title};
pub use markup::{ExtractedText, extract_markup};
pub use media::{
    HomeserverMediaResolver, MediaSubtype, MediaUrlResolver, OutgoingAttachment,
    msgtype_for_mime, outgoing_media_content,
};
pub use relations::RedactionTarget;
pub use thread::{ThreadCache, ThreadNormalizer};
pub use types::{
    ActionDescriptor, ActionType, Attachment, AttachmentType, DEFAULT_MAX_MARKUP_DEPTH,
    DEFAULT_MAX_PARTICIPANTS, Message, NormalizeMode, NormalizerConfig, Participant,
    ReactionSummary, StyleKind, StyleSpan, Thread, ThreadType,
};

use std::sync::Arc;

use crate::event_store::TimelineLookup;
use crate::types::RawEvent;

use processor::NormalizeContext;

/// Normalizes single events on behalf of one user
#[derive(Clone)]
pub struct MessageNormalizer {
    own_user_id: String,
    config: NormalizerConfig,
    resolver: Arc<dyn MediaUrlResolver>,
}

impl MessageNormalizer {
    /// Create a normalizer with default configuration
    pub fn new(own_user_id: impl Into<String>, resolver: Arc<dyn MediaUrlResolver>) -> Self {
        Self::with_config(own_user_id, resolver, NormalizerConfig::default())
    }

    /// Create a normalizer with custom configuration
    pub fn with_config(
        own_user_id: impl Into<String>,
        resolver: Arc<dyn MediaUrlResolver>,
        config: NormalizerConfig,
    ) -> Self {
        Self {
            own_user_id: own_user_id.into(),
            config,
            resolver,
        }
    }

    /// Normalize one event.
    ///
    /// Returns `None` when the event has nothing to display: unrecognized
    /// kinds, relational events in [`NormalizeMode::Aggregate`], and
    /// reactions or redactions whose target cannot be resolved.
    pub fn normalize(
        &self,
        event: &RawEvent,
        lookup: &impl TimelineLookup,
        mode: NormalizeMode,
    ) -> Option<Message> {
        let ctx = NormalizeContext {
            own_user_id: &self.own_user_id,
            config: &self.config,
            resolver: self.resolver.as_ref(),
        };
        processor::normalize_event(event, lookup, mode, &ctx)
    }

    /// Get the current configuration
    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    pub fn own_user_id(&self) -> &str {
        &self.own_user_id
    }

    pub fn resolver(&self) -> &dyn MediaUrlResolver {
        self.resolver.as_ref()
    }
}

impl std::fmt::Debug for MessageNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageNormalizer")
            .field("own_user_id", &self.own_user_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
