//! In-memory `Messenger` for unit tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::posts::model::MediaRef;
use crate::telegram::{InlineKeyboard, Messenger};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        chat_id: i64,
        html: String,
        keyboard: Option<InlineKeyboard>,
    },
    Media {
        chat_id: i64,
        media: MediaRef,
        caption: Option<String>,
    },
    Album {
        chat_id: i64,
        media: Vec<MediaRef>,
        caption: Option<String>,
    },
    Edit {
        chat_id: i64,
        message_id: i64,
        html: String,
    },
    Delete {
        chat_id: i64,
        message_id: i64,
    },
    Answer {
        text: Option<String>,
    },
}

impl Sent {
    pub fn chat_id(&self) -> Option<i64> {
        match self {
            Self::Text { chat_id, .. }
            | Self::Media { chat_id, .. }
            | Self::Album { chat_id, .. }
            | Self::Edit { chat_id, .. }
            | Self::Delete { chat_id, .. } => Some(*chat_id),
            Self::Answer { .. } => None,
        }
    }
}

pub struct RecordingMessenger {
    log: Mutex<Vec<Sent>>,
    next_id: AtomicI64,
    fail_all: AtomicBool,
    failing_chats: Mutex<HashSet<i64>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1000),
            fail_all: AtomicBool::new(false),
            failing_chats: Mutex::new(HashSet::new()),
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.log.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: i64) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| s.chat_id() == Some(chat_id))
            .collect()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }

    /// Make every send fail until switched back.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn fail_chat(&self, chat_id: i64) {
        self.failing_chats.lock().unwrap().insert(chat_id);
    }

    fn send(&self, chat_id: i64, entry: Sent) -> Result<i64, ChannelError> {
        if self.fail_all.load(Ordering::SeqCst) || self.failing_chats.lock().unwrap().contains(&chat_id)
        {
            return Err(ChannelError::SendFailed {
                name: "test".into(),
                reason: format!("chat {chat_id} unavailable"),
            });
        }
        self.log.lock().unwrap().push(entry);
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(
        &self,
        chat_id: i64,
        html: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<i64, ChannelError> {
        self.send(
            chat_id,
            Sent::Text {
                chat_id,
                html: html.to_string(),
                keyboard: keyboard.cloned(),
            },
        )
    }

    async fn send_media(
        &self,
        chat_id: i64,
        media: &MediaRef,
        caption: Option<&str>,
        _keyboard: Option<&InlineKeyboard>,
    ) -> Result<i64, ChannelError> {
        self.send(
            chat_id,
            Sent::Media {
                chat_id,
                media: media.clone(),
                caption: caption.map(str::to_string),
            },
        )
    }

    async fn send_album(
        &self,
        chat_id: i64,
        media: &[MediaRef],
        caption: Option<&str>,
    ) -> Result<Vec<i64>, ChannelError> {
        let first = self.send(
            chat_id,
            Sent::Album {
                chat_id,
                media: media.to_vec(),
                caption: caption.map(str::to_string),
            },
        )?;
        let rest = (1..media.len()).map(|_| self.next_id.fetch_add(1, Ordering::SeqCst));
        Ok(std::iter::once(first).chain(rest).collect())
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i64,
        html: &str,
        _keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), ChannelError> {
        self.send(
            chat_id,
            Sent::Edit {
                chat_id,
                message_id,
                html: html.to_string(),
            },
        )
        .map(|_| ())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), ChannelError> {
        self.log.lock().unwrap().push(Sent::Delete {
            chat_id,
            message_id,
        });
        Ok(())
    }

    async fn answer_callback(
        &self,
        _callback_id: &str,
        text: Option<&str>,
        _alert: bool,
    ) -> Result<(), ChannelError> {
        self.log.lock().unwrap().push(Sent::Answer {
            text: text.map(str::to_string),
        });
        Ok(())
    }
}
