//! Bounded per-chat record of recent channel posts.
//!
//! The Bot API cannot read a channel's history, so every `channel_post` the
//! bot sees is kept here. Previews and publishing re-fetch source media from
//! this record instead of from the platform.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::posts::model::MediaRef;
use crate::telegram::types::Message;

/// Messages kept per source chat.
pub const DEFAULT_CAPACITY_PER_CHAT: usize = 500;

/// A channel message as observed on arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub group_id: Option<String>,
    pub text: String,
    pub media: Option<MediaRef>,
}

impl SourceMessage {
    pub fn from_message(msg: &Message) -> Self {
        Self {
            chat_id: msg.chat.id,
            message_id: msg.message_id,
            group_id: msg.media_group_id.clone(),
            text: msg.text_or_caption().to_string(),
            media: msg.media(),
        }
    }
}

/// Read access to recent source messages.
#[async_trait]
pub trait SourceHistory: Send + Sync {
    async fn fetch_message(&self, chat_id: i64, message_id: i64) -> Option<SourceMessage>;

    /// Messages with `min_id <= id <= max_id`, ascending id.
    async fn fetch_window(&self, chat_id: i64, min_id: i64, max_id: i64) -> Vec<SourceMessage>;
}

/// In-memory `SourceHistory` fed by the update poller.
pub struct MessageHistory {
    capacity_per_chat: usize,
    chats: RwLock<HashMap<i64, BTreeMap<i64, SourceMessage>>>,
}

impl MessageHistory {
    pub fn new(capacity_per_chat: usize) -> Self {
        Self {
            capacity_per_chat: capacity_per_chat.max(1),
            chats: RwLock::new(HashMap::new()),
        }
    }

    /// Remember a message, evicting the oldest ones past capacity.
    pub async fn record(&self, message: SourceMessage) {
        let mut chats = self.chats.write().await;
        let chat = chats.entry(message.chat_id).or_default();
        chat.insert(message.message_id, message);
        while chat.len() > self.capacity_per_chat {
            chat.pop_first();
        }
    }

    pub async fn len(&self, chat_id: i64) -> usize {
        self.chats
            .read()
            .await
            .get(&chat_id)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

impl Default for MessageHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY_PER_CHAT)
    }
}

#[async_trait]
impl SourceHistory for MessageHistory {
    async fn fetch_message(&self, chat_id: i64, message_id: i64) -> Option<SourceMessage> {
        self.chats
            .read()
            .await
            .get(&chat_id)
            .and_then(|chat| chat.get(&message_id))
            .cloned()
    }

    async fn fetch_window(&self, chat_id: i64, min_id: i64, max_id: i64) -> Vec<SourceMessage> {
        if min_id > max_id {
            return Vec::new();
        }
        self.chats
            .read()
            .await
            .get(&chat_id)
            .map(|chat| chat.range(min_id..=max_id).map(|(_, m)| m.clone()).collect())
            .unwrap_or_default()
    }
}
