//! Renders a post into a chat: previews for operators, republishing to the target.
//!
//! Media goes out by the file ids captured with the post. Rows captured without
//! one are resolved from the source history by message id. Albums go out as
//! media groups with the caption on the first item; text beyond the caption
//! limit follows as separate messages.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::format::{self, CAPTION_LIMIT, TEXT_LIMIT};
use crate::posts::model::{MediaItem, MediaRef, Post};
use crate::telegram::{Messenger, SourceHistory};

/// Messages searched on each side of an album's anchor.
pub const ALBUM_WINDOW: i64 = 20;

/// Largest media group the platform accepts.
const MAX_ALBUM_ITEMS: usize = 10;

pub struct Publisher {
    messenger: Arc<dyn Messenger>,
    history: Arc<dyn SourceHistory>,
}

impl Publisher {
    pub fn new(messenger: Arc<dyn Messenger>, history: Arc<dyn SourceHistory>) -> Self {
        Self { messenger, history }
    }

    pub fn messenger(&self) -> &Arc<dyn Messenger> {
        &self.messenger
    }

    /// Send `post` with its current text to `chat_id`. Returns the sent message ids.
    ///
    /// A post with media is never sent without it: when none of its media can
    /// be resolved nothing is sent and `MediaUnavailable` is returned.
    pub async fn deliver(
        &self,
        chat_id: i64,
        post: &Post,
        items: &[MediaItem],
    ) -> Result<Vec<i64>, ChannelError> {
        let html = format::md_to_html(post.current_text());
        let media = self.resolve_media(post, items).await;
        if !items.is_empty() && media.is_empty() {
            warn!(
                post_id = post.id,
                source_chat_id = post.source_chat_id,
                "Source media unavailable, not sending"
            );
            return Err(ChannelError::MediaUnavailable { post_id: post.id });
        }
        self.send_rendered(chat_id, &html, &media).await
    }

    /// Look up the platform handles for a post's media, in album order.
    pub async fn resolve_media(&self, post: &Post, items: &[MediaItem]) -> Vec<MediaRef> {
        if items.is_empty() {
            return Vec::new();
        }

        let stored: Vec<MediaRef> = items.iter().filter_map(MediaItem::media_ref).collect();
        if stored.len() == items.len() {
            return stored;
        }
        self.resolve_from_history(post, items).await
    }

    async fn resolve_from_history(&self, post: &Post, items: &[MediaItem]) -> Vec<MediaRef> {
        let Some(group_id) = post.media_group_id.as_deref() else {
            let message_id = items
                .first()
                .map(|item| item.message_id)
                .unwrap_or(post.source_message_id);
            return self
                .history
                .fetch_message(post.source_chat_id, message_id)
                .await
                .and_then(|m| m.media)
                .into_iter()
                .collect();
        };

        let anchor = post.source_message_id;
        let members: Vec<_> = self
            .history
            .fetch_window(post.source_chat_id, anchor - ALBUM_WINDOW, anchor + ALBUM_WINDOW)
            .await
            .into_iter()
            .filter(|m| m.group_id.as_deref() == Some(group_id) && m.media.is_some())
            .collect();

        let persisted: HashSet<i64> = items.iter().map(|item| item.message_id).collect();
        let restricted: Vec<_> = members
            .iter()
            .filter(|m| persisted.contains(&m.message_id))
            .cloned()
            .collect();
        let chosen = if restricted.is_empty() { members } else { restricted };

        debug!(post_id = post.id, resolved = chosen.len(), "Album media resolved");
        chosen.into_iter().filter_map(|m| m.media).collect()
    }

    async fn send_rendered(
        &self,
        chat_id: i64,
        html: &str,
        media: &[MediaRef],
    ) -> Result<Vec<i64>, ChannelError> {
        let mut sent = Vec::new();

        if media.is_empty() {
            if html.is_empty() {
                warn!(chat_id, "Nothing to send: post has no text and no media");
            }
            for chunk in format::split_html_safe(html, TEXT_LIMIT) {
                sent.push(self.messenger.send_text(chat_id, &chunk, None).await?);
            }
            return Ok(sent);
        }

        let (caption, tail) = format::split_caption_and_tail(html, CAPTION_LIMIT);
        let caption = (!caption.is_empty()).then_some(caption.as_str());

        for (i, batch) in media.chunks(MAX_ALBUM_ITEMS).enumerate() {
            let caption = if i == 0 { caption } else { None };
            match batch {
                [single] => {
                    sent.push(self.messenger.send_media(chat_id, single, caption, None).await?);
                }
                _ => sent.extend(self.messenger.send_album(chat_id, batch, caption).await?),
            }
        }

        for chunk in format::split_html_safe(&tail, TEXT_LIMIT) {
            sent.push(self.messenger.send_text(chat_id, &chunk, None).await?);
        }
        Ok(sent)
    }
}
