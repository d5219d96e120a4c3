//! Persists captured posts and tells the operators about them.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::monitor::album::CaptureSink;
use crate::posts::model::NewPost;
use crate::posts::notifier::{Notifier, PostNotice};
use crate::registry::ChannelRegistry;
use crate::store::Database;

pub struct Ingest {
    db: Arc<dyn Database>,
    registry: Arc<ChannelRegistry>,
    notifier: Notifier,
}

impl Ingest {
    pub fn new(db: Arc<dyn Database>, registry: Arc<ChannelRegistry>, notifier: Notifier) -> Self {
        Self {
            db,
            registry,
            notifier,
        }
    }
}

#[async_trait]
impl CaptureSink for Ingest {
    async fn capture(&self, post: NewPost) {
        let post_id = match self.db.insert_post(&post).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                info!(
                    source_chat_id = post.source_chat_id,
                    group_id = post.media_group_id.as_deref().unwrap_or_default(),
                    "Album already captured, skipping"
                );
                return;
            }
            Err(e) => {
                error!(
                    source_chat_id = post.source_chat_id,
                    message_id = post.source_message_id,
                    "Failed to save post: {e}"
                );
                return;
            }
        };

        info!(
            post_id,
            source_chat_id = post.source_chat_id,
            media = post.media.len(),
            "Post captured"
        );

        let source_title = self
            .registry
            .lookup(post.source_chat_id)
            .await
            .map(|c| c.title)
            .unwrap_or_else(|| post.source_chat_id.to_string());

        self.notifier
            .notify(&PostNotice {
                post_id,
                source_title,
                text_chars: post.original_text.chars().count(),
                media_count: post.media.len(),
            })
            .await;
    }
}
