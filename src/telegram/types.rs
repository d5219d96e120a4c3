//! Bot API wire types: the subset of updates and markup the relay uses.

use serde::{Deserialize, Serialize};

use crate::posts::model::{MediaKind, MediaRef};

/// One entry of a `getUpdates` result.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub channel_post: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// Any non-photo file attachment; only the reusable handle matters here.
#[derive(Debug, Clone, Deserialize)]
pub struct FileAttachment {
    pub file_id: String,
}

/// Where a forwarded message came from (Bot API `MessageOrigin`).
#[derive(Debug, Clone, Deserialize)]
pub struct MessageOrigin {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub chat: Option<Chat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub media_group_id: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    pub video: Option<FileAttachment>,
    #[serde(default)]
    pub animation: Option<FileAttachment>,
    #[serde(default)]
    pub document: Option<FileAttachment>,
    #[serde(default)]
    pub audio: Option<FileAttachment>,
    #[serde(default)]
    pub voice: Option<FileAttachment>,
    #[serde(default)]
    pub forward_origin: Option<MessageOrigin>,
    #[serde(default)]
    pub forward_from_chat: Option<Chat>,
}

impl Message {
    /// Message text, or the media caption.
    pub fn text_or_caption(&self) -> &str {
        self.text
            .as_deref()
            .or(self.caption.as_deref())
            .unwrap_or_default()
    }

    /// The sendable file attached to this message, if any.
    ///
    /// Link previews are not attachments. A GIF arrives with both `animation`
    /// and `document`; the animation wins.
    pub fn media(&self) -> Option<MediaRef> {
        let file = |kind: MediaKind, f: &FileAttachment| MediaRef {
            kind,
            file_id: f.file_id.clone(),
        };

        if let Some(largest) = self.photo.as_ref().and_then(|sizes| sizes.last()) {
            return Some(MediaRef {
                kind: MediaKind::Photo,
                file_id: largest.file_id.clone(),
            });
        }
        self.video
            .as_ref()
            .map(|f| file(MediaKind::Video, f))
            .or_else(|| self.animation.as_ref().map(|f| file(MediaKind::Animation, f)))
            .or_else(|| self.document.as_ref().map(|f| file(MediaKind::Document, f)))
            .or_else(|| self.audio.as_ref().map(|f| file(MediaKind::Audio, f)))
            .or_else(|| self.voice.as_ref().map(|f| file(MediaKind::Voice, f)))
    }

    /// Channel this message was forwarded from: `(chat_id, title)`.
    pub fn forwarded_channel(&self) -> Option<(i64, Option<String>)> {
        if let Some(origin) = &self.forward_origin {
            if origin.kind == "channel" {
                return origin.chat.as_ref().map(|c| (c.id, c.title.clone()));
            }
        }
        self.forward_from_chat
            .as_ref()
            .filter(|c| c.kind == "channel")
            .map(|c| (c.id, c.title.clone()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

// ── Outbound markup ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl InlineButton {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: Some(data.into()),
            url: None,
        }
    }

    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: None,
            url: Some(url.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self {
            inline_keyboard: rows,
        }
    }

    pub fn row(mut self, buttons: Vec<InlineButton>) -> Self {
        self.inline_keyboard.push(buttons);
        self
    }

    /// All callback payloads, row by row.
    pub fn callback_data(&self) -> Vec<&str> {
        self.inline_keyboard
            .iter()
            .flatten()
            .filter_map(|b| b.callback_data.as_deref())
            .collect()
    }
}
