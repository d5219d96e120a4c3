//! Telegram platform adapter: Bot API client, update polling, source history.
//!
//! Everything above this module talks to the platform through the
//! `Messenger` and `SourceHistory` traits.

pub mod api;
pub mod history;
pub mod poller;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use api::TelegramBot;
pub use history::{MessageHistory, SourceHistory, SourceMessage};
pub use types::{CallbackQuery, InlineButton, InlineKeyboard, Message, Update};

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::posts::model::MediaRef;

/// Outbound messaging operations. All text is Telegram HTML.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send one text message (≤ 4096 chars). Returns its message id.
    async fn send_text(
        &self,
        chat_id: i64,
        html: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<i64, ChannelError>;

    /// Send a single file by handle with an optional caption (≤ 1024 chars).
    async fn send_media(
        &self,
        chat_id: i64,
        media: &MediaRef,
        caption: Option<&str>,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<i64, ChannelError>;

    /// Send files as one album; the caption goes on the first item.
    async fn send_album(
        &self,
        chat_id: i64,
        media: &[MediaRef],
        caption: Option<&str>,
    ) -> Result<Vec<i64>, ChannelError>;

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i64,
        html: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), ChannelError>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), ChannelError>;

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> Result<(), ChannelError>;
}
