//! Channel monitor: turns `channel_post` updates from monitored sources into
//! captured posts.

pub mod album;
pub mod ingest;

pub use album::{AlbumAggregator, CaptureSink};
pub use ingest::Ingest;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::registry::ChannelRegistry;
use crate::telegram::{Message, MessageHistory, SourceMessage};

pub struct ChannelMonitor {
    registry: Arc<ChannelRegistry>,
    history: Arc<MessageHistory>,
    aggregator: Arc<AlbumAggregator>,
}

impl ChannelMonitor {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        history: Arc<MessageHistory>,
        aggregator: Arc<AlbumAggregator>,
    ) -> Self {
        Self {
            registry,
            history,
            aggregator,
        }
    }

    /// Handle one channel post. Returns false when the chat is not a monitored source.
    pub async fn handle_channel_post(&self, msg: &Message) -> bool {
        let source_msg = SourceMessage::from_message(msg);
        self.history.record(source_msg.clone()).await;

        let Some(source) = self.registry.lookup(msg.chat.id).await else {
            debug!(chat_id = msg.chat.id, "Ignoring post from unmonitored chat");
            return false;
        };

        info!(
            channel_id = source.id,
            chat_id = msg.chat.id,
            message_id = msg.message_id,
            grouped = msg.media_group_id.is_some(),
            "New post in source"
        );

        if let Some(title) = msg.chat.title.as_deref()
            && !title.is_empty()
            && title != source.title
            && let Err(e) = self.registry.rename(source.id, title).await
        {
            warn!(channel_id = source.id, "Failed to refresh source title: {e}");
        }

        self.aggregator.on_message(&source_msg).await;
        true
    }
}
