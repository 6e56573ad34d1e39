//! Media attachments
//!
//! MIME bucketing for inbound attachments, the matching outbound mapping used
//! when building attachment content to send, and content-URI resolution.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::types::RawEvent;

use super::types::{Attachment, AttachmentType};

const GIF_MIME: &str = "image/gif";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaSubtype {
    Img,
    Audio,
    Video,
    File,
}

impl MediaSubtype {
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            MediaSubtype::Img
        } else if mime.starts_with("audio/") {
            MediaSubtype::Audio
        } else if mime.starts_with("video/") {
            MediaSubtype::Video
        } else {
            MediaSubtype::File
        }
    }

    pub fn from_msgtype(msgtype: &str) -> Self {
        match msgtype {
            "m.image" => MediaSubtype::Img,
            "m.audio" => MediaSubtype::Audio,
            "m.video" => MediaSubtype::Video,
            _ => MediaSubtype::File,
        }
    }

    pub fn msgtype(self) -> &'static str {
        match self {
            MediaSubtype::Img => "m.image",
            MediaSubtype::Audio => "m.audio",
            MediaSubtype::Video => "m.video",
            MediaSubtype::File => "m.file",
        }
    }

    pub fn attachment_type(self) -> AttachmentType {
        match self {
            MediaSubtype::Img => AttachmentType::Img,
            MediaSubtype::Audio => AttachmentType::Audio,
            MediaSubtype::Video => AttachmentType::Video,
            MediaSubtype::File => AttachmentType::Unknown,
        }
    }
}

/// Message type to use when sending a file of the given MIME type.
///
/// Kept in lockstep with [`MediaSubtype::from_mime`] so an attachment we send
/// classifies the same way when its echo comes back.
pub fn msgtype_for_mime(mime: &str) -> &'static str {
    MediaSubtype::from_mime(mime).msgtype()
}

/// Maps a content-addressed media reference to a fetchable URL.
pub trait MediaUrlResolver: Send + Sync {
    fn resolve(&self, content_uri: &str) -> Option<String>;
}

/// Resolves `mxc://server/media` references against a homeserver's
/// download endpoint. Pure string rewrite, no request is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomeserverMediaResolver {
    base_url: String,
}

impl HomeserverMediaResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl MediaUrlResolver for HomeserverMediaResolver {
    fn resolve(&self, content_uri: &str) -> Option<String> {
        let (server, media_id) = content_uri.strip_prefix("mxc://")?.split_once('/')?;
        if server.is_empty() || media_id.is_empty() || media_id.contains('/') {
            return None;
        }
        Some(format!(
            "{}/_matrix/media/v3/download/{}/{}",
            self.base_url, server, media_id
        ))
    }
}

/// Builds the attachment described by a media event.
pub fn build_attachment(
    event: &RawEvent,
    subtype: MediaSubtype,
    resolver: &dyn MediaUrlResolver,
) -> Attachment {
    let content = &event.content;
    let info = content.get("info");
    let info_u64 = |key: &str| info.and_then(|i| i.get(key)).and_then(Value::as_u64);

    // Encrypted files carry their URI inside `file`
    let content_uri = event
        .content_str("url")
        .or_else(|| {
            content
                .get("file")
                .and_then(|file| file.get("url"))
                .and_then(Value::as_str)
        });

    let mime_type = info
        .and_then(|i| i.get("mimetype"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let file_name = event
        .content_str("filename")
        .or_else(|| event.content_str("body"))
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    Attachment {
        id: event.event_id.clone(),
        attachment_type: subtype.attachment_type(),
        src_url: content_uri.and_then(|uri| resolver.resolve(uri)),
        is_gif: mime_type.as_deref() == Some(GIF_MIME),
        mime_type,
        file_name,
        file_size: info_u64("size"),
        width: info_u64("w").and_then(|w| u32::try_from(w).ok()),
        height: info_u64("h").and_then(|h| u32::try_from(h).ok()),
    }
}

/// A local file about to be sent as an attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingAttachment {
    pub mime_type: String,
    pub file_name: String,
    pub size: u64,
    /// (width, height), used only for images
    pub dimensions: Option<(u32, u32)>,
    /// Caption sent as the body instead of the file name
    pub caption: Option<String>,
}

/// Builds message content for an uploaded attachment.
pub fn outgoing_media_content(content_uri: &str, attachment: &OutgoingAttachment) -> Value {
    let msgtype = msgtype_for_mime(&attachment.mime_type);

    let mut info = Map::new();
    info.insert("mimetype".to_string(), json!(attachment.mime_type));
    info.insert("size".to_string(), json!(attachment.size));
    if msgtype == MediaSubtype::Img.msgtype() {
        if let Some((width, height)) = attachment.dimensions {
            info.insert("w".to_string(), json!(width));
            info.insert("h".to_string(), json!(height));
        }
    }

    let body = attachment
        .caption
        .as_deref()
        .filter(|caption| !caption.is_empty())
        .unwrap_or(&attachment.file_name);

    json!({
        "msgtype": msgtype,
        "url": content_uri,
        "body": body,
        "info": Value::Object(info),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::classifier::{ContentKind, classify};

    fn media_event(content: Value) -> RawEvent {
        serde_json::from_value(json!({
            "event_id": "$media",
            "room_id": "!room:example.org",
            "type": "m.room.message",
            "sender": "@alice:example.org",
            "origin_server_ts": 1,
            "content": content
        }))
        .unwrap()
    }

    #[test]
    fn test_mime_buckets() {
        assert_eq!(MediaSubtype::from_mime("image/png"), MediaSubtype::Img);
        assert_eq!(MediaSubtype::from_mime("IMAGE/JPEG"), MediaSubtype::Img);
        assert_eq!(MediaSubtype::from_mime("audio/ogg"), MediaSubtype::Audio);
        assert_eq!(MediaSubtype::from_mime("video/webm"), MediaSubtype::Video);
        assert_eq!(MediaSubtype::from_mime("application/pdf"), MediaSubtype::File);
        assert_eq!(MediaSubtype::from_mime(""), MediaSubtype::File);
    }

    #[test]
    fn test_outbound_mapping_is_symmetric() {
        let mimes = [
            "image/gif",
            "image/png",
            "audio/mpeg",
            "video/mp4",
            "application/zip",
            "text/plain",
            "",
        ];
        for mime in mimes {
            assert_eq!(
                MediaSubtype::from_msgtype(msgtype_for_mime(mime)),
                MediaSubtype::from_mime(mime),
                "mime {mime:?}"
            );
        }
    }

    #[test]
    fn test_sent_attachment_classifies_consistently() {
        let outgoing = OutgoingAttachment {
            mime_type: "image/png".to_string(),
            file_name: "cat.png".to_string(),
            size: 1024,
            dimensions: Some((640, 480)),
            caption: None,
        };
        let content = outgoing_media_content("mxc://example.org/abc", &outgoing);
        let echoed = media_event(content);

        assert_eq!(
            classify(&echoed),
            ContentKind::MediaAttachment(MediaSubtype::Img)
        );
    }

    #[test]
    fn test_outgoing_content_shape() {
        let image = OutgoingAttachment {
            mime_type: "image/jpeg".to_string(),
            file_name: "photo.jpg".to_string(),
            size: 2048,
            dimensions: Some((800, 600)),
            caption: Some("look".to_string()),
        };
        let content = outgoing_media_content("mxc://example.org/img", &image);
        assert_eq!(content["msgtype"], "m.image");
        assert_eq!(content["body"], "look");
        assert_eq!(content["info"]["w"], 800);
        assert_eq!(content["info"]["h"], 600);
        assert_eq!(content["info"]["size"], 2048);

        let file = OutgoingAttachment {
            mime_type: "application/pdf".to_string(),
            file_name: "doc.pdf".to_string(),
            size: 10,
            dimensions: Some((1, 1)),
            caption: None,
        };
        let content = outgoing_media_content("mxc://example.org/doc", &file);
        assert_eq!(content["msgtype"], "m.file");
        assert_eq!(content["body"], "doc.pdf");
        assert!(content["info"].get("w").is_none());
    }

    #[test]
    fn test_homeserver_resolver() {
        let resolver = HomeserverMediaResolver::new("https://matrix.example.org/");
        assert_eq!(resolver.base_url(), "https://matrix.example.org");
        assert_eq!(
            resolver.resolve("mxc://example.org/abc123"),
            Some("https://matrix.example.org/_matrix/media/v3/download/example.org/abc123".to_string())
        );
        assert_eq!(resolver.resolve("https://example.org/a.png"), None);
        assert_eq!(resolver.resolve("mxc://example.org"), None);
        assert_eq!(resolver.resolve("mxc:///abc"), None);
        assert_eq!(resolver.resolve("mxc://example.org/a/b"), None);
    }

    #[test]
    fn test_build_attachment_copies_metadata() {
        let resolver = HomeserverMediaResolver::new("https://hs.example.org");
        let event = media_event(json!({
            "msgtype": "m.image",
            "body": "funny.gif",
            "url": "mxc://example.org/gif",
            "info": { "mimetype": "image/gif", "size": 4096, "w": 320, "h": 240 }
        }));

        let attachment = build_attachment(&event, MediaSubtype::Img, &resolver);
        assert_eq!(attachment.id, "$media");
        assert_eq!(attachment.attachment_type, AttachmentType::Img);
        assert_eq!(
            attachment.src_url.as_deref(),
            Some("https://hs.example.org/_matrix/media/v3/download/example.org/gif")
        );
        assert_eq!(attachment.mime_type.as_deref(), Some("image/gif"));
        assert_eq!(attachment.file_name.as_deref(), Some("funny.gif"));
        assert_eq!(attachment.file_size, Some(4096));
        assert_eq!(attachment.width, Some(320));
        assert_eq!(attachment.height, Some(240));
        assert!(attachment.is_gif);
    }

    #[test]
    fn test_build_attachment_without_info() {
        let resolver = HomeserverMediaResolver::new("https://hs.example.org");
        let event = media_event(json!({
            "msgtype": "m.file",
            "body": "",
            "file": { "url": "mxc://example.org/enc" }
        }));

        let attachment = build_attachment(&event, MediaSubtype::File, &resolver);
        assert_eq!(attachment.attachment_type, AttachmentType::Unknown);
        assert!(attachment.src_url.is_some());
        assert_eq!(attachment.mime_type, None);
        assert_eq!(attachment.file_name, None);
        assert_eq!(attachment.width, None);
        assert!(!attachment.is_gif);
    }
}
