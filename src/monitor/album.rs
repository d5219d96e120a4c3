//! Album aggregation: turns the separately delivered members of a media group
//! into one post.
//!
//! Each merge restarts the debounce timer for its `(chat_id, group_id)` key.
//! A timer only flushes if it is still the newest one for its key. On shutdown
//! every pending timer fires at once, so no buffered album is lost.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::posts::model::{MediaRef, NewMediaItem, NewPost};
use crate::telegram::SourceMessage;

/// Receives every post the aggregator produces.
#[async_trait]
pub trait CaptureSink: Send + Sync {
    async fn capture(&self, post: NewPost);
}

type AlbumKey = (i64, String);

/// Members of one media group seen so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumBuffer {
    /// Lowest message id seen; becomes the post's anchor.
    pub first_message_id: i64,
    pub text: String,
    pub media: Vec<NewMediaItem>,
}

impl AlbumBuffer {
    fn new(message_id: i64) -> Self {
        Self {
            first_message_id: message_id,
            text: String::new(),
            media: Vec::new(),
        }
    }

    fn merge(&mut self, message_id: i64, text: &str, media: Option<&MediaRef>) {
        self.first_message_id = self.first_message_id.min(message_id);
        if self.text.is_empty() && !text.is_empty() {
            self.text = text.to_string();
        }
        if let Some(media) = media {
            self.media.push(NewMediaItem::captured(message_id, media));
        }
    }

    fn into_post(mut self, chat_id: i64, group_id: String) -> NewPost {
        self.media.sort_by_key(|m| m.message_id);
        NewPost {
            source_chat_id: chat_id,
            source_message_id: self.first_message_id,
            media_group_id: Some(group_id),
            original_text: self.text,
            media: self.media,
        }
    }
}

struct PendingAlbum {
    buffer: AlbumBuffer,
    generation: u64,
    timer: CancellationToken,
}

#[derive(Default)]
struct AlbumState {
    pending: HashMap<AlbumKey, PendingAlbum>,
    next_generation: u64,
}

pub struct AlbumAggregator {
    sink: Arc<dyn CaptureSink>,
    debounce: Duration,
    state: Mutex<AlbumState>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl AlbumAggregator {
    pub fn new(
        sink: Arc<dyn CaptureSink>,
        debounce: Duration,
        tracker: TaskTracker,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            sink,
            debounce,
            state: Mutex::new(AlbumState::default()),
            tracker,
            shutdown,
        })
    }

    /// Route one source message: grouped messages are buffered, the rest are
    /// captured right away.
    pub async fn on_message(self: &Arc<Self>, msg: &SourceMessage) {
        let Some(group_id) = msg.group_id.clone() else {
            let post = NewPost {
                source_chat_id: msg.chat_id,
                source_message_id: msg.message_id,
                media_group_id: None,
                original_text: msg.text.clone(),
                media: msg
                    .media
                    .iter()
                    .map(|media| NewMediaItem::captured(msg.message_id, media))
                    .collect(),
            };
            self.sink.capture(post).await;
            return;
        };

        let key = (msg.chat_id, group_id);
        let (generation, timer) = {
            let mut state = self.state.lock().await;
            state.next_generation += 1;
            let generation = state.next_generation;
            let timer = self.shutdown.child_token();

            let pending = state
                .pending
                .entry(key.clone())
                .or_insert_with(|| PendingAlbum {
                    buffer: AlbumBuffer::new(msg.message_id),
                    generation,
                    timer: CancellationToken::new(),
                });
            pending.buffer.merge(msg.message_id, &msg.text, msg.media.as_ref());
            // Supersede the previous timer for this key.
            pending.timer.cancel();
            pending.timer = timer.clone();
            pending.generation = generation;
            (generation, timer)
        };

        debug!(
            chat_id = key.0,
            group_id = %key.1,
            message_id = msg.message_id,
            "Album member buffered"
        );
        self.schedule_flush(key, generation, timer);
    }

    fn schedule_flush(self: &Arc<Self>, key: AlbumKey, generation: u64, timer: CancellationToken) {
        let this = Arc::clone(self);
        self.tracker.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(this.debounce) => {}
                _ = timer.cancelled() => {
                    // Superseded by a newer member unless we are shutting down.
                    if !this.shutdown.is_cancelled() {
                        return;
                    }
                }
            }
            if let Some(buffer) = this.take(&key, Some(generation)).await {
                this.flush(key, buffer).await;
            }
        });
    }

    /// Flush the album for `(chat_id, group_id)` immediately.
    ///
    /// Returns false when nothing was buffered, e.g. because it already flushed.
    pub async fn flush_now(&self, chat_id: i64, group_id: &str) -> bool {
        let key = (chat_id, group_id.to_string());
        match self.take(&key, None).await {
            Some(buffer) => {
                self.flush(key, buffer).await;
                true
            }
            None => false,
        }
    }

    /// Number of albums still waiting for their quiet period.
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    async fn take(&self, key: &AlbumKey, generation: Option<u64>) -> Option<AlbumBuffer> {
        let mut state = self.state.lock().await;
        let current = state.pending.get(key)?;
        if generation.is_some_and(|g| g != current.generation) {
            return None;
        }
        let pending = state.pending.remove(key)?;
        pending.timer.cancel();
        Some(pending.buffer)
    }

    async fn flush(&self, (chat_id, group_id): AlbumKey, buffer: AlbumBuffer) {
        info!(
            chat_id,
            group_id = %group_id,
            anchor = buffer.first_message_id,
            media = buffer.media.len(),
            "Flushing album"
        );
        self.sink.capture(buffer.into_post(chat_id, group_id)).await;
    }
}
