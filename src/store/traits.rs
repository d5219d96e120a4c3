//! `Database` trait: single async interface for all persistence.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::posts::model::{MediaItem, NewPost, Post};

/// What a registered channel is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    /// Monitored for new posts.
    Source,
    /// Receives published posts.
    Target,
}

impl ChannelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Target => "target",
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(Self::Source),
            "target" => Ok(Self::Target),
            other => Err(format!("unknown channel role: {other}")),
        }
    }
}

/// A registered channel. `chat_id` is always in Bot API form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: i64,
    pub chat_id: i64,
    pub role: ChannelRole,
    pub title: String,
    pub is_active: bool,
}

/// Backend-agnostic database trait covering channels, posts, and settings.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Channels ────────────────────────────────────────────────────

    /// Register a channel. Fails with `Constraint` if the chat id is taken.
    async fn insert_channel(
        &self,
        chat_id: i64,
        role: ChannelRole,
        title: &str,
    ) -> Result<Channel, DatabaseError>;

    async fn get_channel(&self, id: i64) -> Result<Option<Channel>, DatabaseError>;

    async fn get_channel_by_chat_id(&self, chat_id: i64) -> Result<Option<Channel>, DatabaseError>;

    /// All channels with `role`, ascending id.
    async fn list_channels(&self, role: ChannelRole) -> Result<Vec<Channel>, DatabaseError>;

    /// Active sources, ascending id.
    async fn list_active_sources(&self) -> Result<Vec<Channel>, DatabaseError>;

    /// The first active target by ascending id.
    async fn active_target(&self) -> Result<Option<Channel>, DatabaseError>;

    /// Replace every target with `chat_id` in one transaction.
    async fn replace_target(&self, chat_id: i64, title: &str) -> Result<Channel, DatabaseError>;

    /// Returns `false` when no channel has that id.
    async fn set_channel_active(&self, id: i64, active: bool) -> Result<bool, DatabaseError>;

    async fn rename_channel(&self, id: i64, title: &str) -> Result<bool, DatabaseError>;

    async fn delete_channel(&self, id: i64) -> Result<bool, DatabaseError>;

    // ── Posts ───────────────────────────────────────────────────────

    /// Insert a post and its media items atomically.
    ///
    /// Media items are stored in ascending message-id order. Returns `None`
    /// when an album with the same `(source_chat_id, media_group_id)` already
    /// exists; nothing is written in that case.
    async fn insert_post(&self, post: &NewPost) -> Result<Option<i64>, DatabaseError>;

    async fn get_post(&self, id: i64) -> Result<Option<Post>, DatabaseError>;

    /// Media items of a post ordered by `sort_index`.
    async fn list_media_items(&self, post_id: i64) -> Result<Vec<MediaItem>, DatabaseError>;

    /// Most recent posts first.
    async fn list_posts(&self, limit: usize) -> Result<Vec<Post>, DatabaseError>;

    /// Set or clear the rewritten text. Returns `false` when the post is gone.
    async fn set_rewritten_text(&self, id: i64, text: Option<&str>) -> Result<bool, DatabaseError>;

    /// Delete a post and its media items.
    async fn delete_post(&self, id: i64) -> Result<bool, DatabaseError>;

    // ── Settings ────────────────────────────────────────────────────

    async fn get_setting(&self, key: &str) -> Result<Option<String>, DatabaseError>;

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), DatabaseError>;

    /// Remove the given keys. Returns how many rows were deleted.
    async fn delete_settings(&self, keys: &[&str]) -> Result<usize, DatabaseError>;
}
