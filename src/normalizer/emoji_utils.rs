/// Reaction keys longer than this many bytes are ignored
pub const MAX_REACTION_KEY_BYTES: usize = 64;

const SKIN_TONES_AND_VARIATIONS: [char; 6] = [
    '\u{1F3FB}',
    '\u{1F3FC}',
    '\u{1F3FD}',
    '\u{1F3FE}',
    '\u{1F3FF}',
    '\u{FE0F}',
];

/// A reaction offered in quick-pick menus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedReaction {
    pub key: &'static str,
    pub title: &'static str,
}

pub const SUPPORTED_REACTIONS: [SupportedReaction; 6] = [
    SupportedReaction { key: "❤️", title: "Heart" },
    SupportedReaction { key: "👍", title: "Like" },
    SupportedReaction { key: "👎", title: "Dislike" },
    SupportedReaction { key: "😂", title: "Laugh" },
    SupportedReaction { key: "😲", title: "Surprised" },
    SupportedReaction { key: "😢", title: "Cry" },
];

/// Title of a quick-pick reaction. Skin tones and variation selectors are
/// ignored, so `❤` and `❤️` both match. Other keys remain valid reactions,
/// they just have no title.
pub fn supported_reaction_title(key: &str) -> Option<&'static str> {
    let normalized = normalize_emoji_string(key);
    SUPPORTED_REACTIONS
        .iter()
        .find(|reaction| normalize_emoji_string(reaction.key) == normalized)
        .map(|reaction| reaction.title)
}

/// Validates an annotation key and optionally normalizes it.
///
/// Keys are free text, so anything non-blank within the size bound is
/// accepted; emoji are the common case.
pub fn validate_and_normalize_reaction(key: &str, normalize_emoji: bool) -> Option<String> {
    if key.trim().is_empty() || key.len() > MAX_REACTION_KEY_BYTES {
        tracing::debug!(
            target: "threadline::normalizer::emoji_utils",
            "Ignoring reaction key of {} bytes",
            key.len()
        );
        return None;
    }

    if normalize_emoji {
        Some(normalize_emoji_string(key))
    } else {
        Some(key.to_string())
    }
}

/// Normalizes emoji by removing skin tone modifiers and variations
pub fn normalize_emoji_string(emoji: &str) -> String {
    if !emoji.contains(SKIN_TONES_AND_VARIATIONS) {
        return emoji.to_string();
    }

    emoji
        .chars()
        .filter(|c| !SKIN_TONES_AND_VARIATIONS.contains(c))
        .collect()
}
