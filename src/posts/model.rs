//! Post and media item types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of media attached to a captured channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Document,
    Audio,
    Voice,
    Animation,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Voice => "voice",
            Self::Animation => "animation",
        }
    }

    /// Kind used when the item travels inside a media group.
    ///
    /// `sendMediaGroup` only accepts photo, video, document and audio.
    pub fn album_kind(&self) -> MediaKind {
        match self {
            Self::Voice | Self::Animation => Self::Document,
            other => *other,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "photo" => Ok(Self::Photo),
            "video" => Ok(Self::Video),
            "document" => Ok(Self::Document),
            "audio" => Ok(Self::Audio),
            "voice" => Ok(Self::Voice),
            "animation" => Ok(Self::Animation),
            other => Err(format!("unknown media kind: {other}")),
        }
    }
}

/// A media attachment as the platform exposes it: kind plus reusable file handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub file_id: String,
}

/// A captured post awaiting operator review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub source_chat_id: i64,
    /// Anchor message: the message itself, or the lowest id of an album.
    pub source_message_id: i64,
    pub media_group_id: Option<String>,
    pub original_text: String,
    pub rewritten_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Text that would be published right now.
    pub fn current_text(&self) -> &str {
        self.rewritten_text.as_deref().unwrap_or(&self.original_text)
    }

    pub fn is_rewritten(&self) -> bool {
        self.rewritten_text.is_some()
    }
}

/// One media attachment of a post.
///
/// `file_id` is the reusable platform handle captured with the message. Rows
/// written before it was recorded have none and are resolved from the source
/// history instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub id: i64,
    pub post_id: i64,
    pub kind: MediaKind,
    pub message_id: i64,
    pub file_id: Option<String>,
    pub sort_index: i64,
}

impl MediaItem {
    /// The sendable handle, when it was captured.
    pub fn media_ref(&self) -> Option<MediaRef> {
        self.file_id.as_ref().map(|file_id| MediaRef {
            kind: self.kind,
            file_id: file_id.clone(),
        })
    }
}

/// Media member of a post that is about to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMediaItem {
    pub kind: MediaKind,
    pub message_id: i64,
    pub file_id: Option<String>,
}

impl NewMediaItem {
    pub fn captured(message_id: i64, media: &MediaRef) -> Self {
        Self {
            kind: media.kind,
            message_id,
            file_id: Some(media.file_id.clone()),
        }
    }
}

/// A post that is about to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub source_chat_id: i64,
    pub source_message_id: i64,
    pub media_group_id: Option<String>,
    pub original_text: String,
    pub media: Vec<NewMediaItem>,
}
