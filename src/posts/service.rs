//! Post lifecycle: open, rewrite, cancel, publish, delete.
//!
//! A post lives in storage from capture until it is published or deleted.
//! Previews are transient: the message ids an operator currently sees are kept
//! in their session and cleaned up whenever the preview is replaced.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::RelayError;
use crate::operator::keyboards;
use crate::operator::session::OperatorSessions;
use crate::posts::model::{MediaItem, Post};
use crate::posts::publisher::Publisher;
use crate::rewrite::{RewriteMode, RewriteService};
use crate::store::Database;

pub struct PostService {
    db: Arc<dyn Database>,
    publisher: Publisher,
    rewriter: Arc<RewriteService>,
    sessions: Arc<OperatorSessions>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl PostService {
    pub fn new(
        db: Arc<dyn Database>,
        publisher: Publisher,
        rewriter: Arc<RewriteService>,
        sessions: Arc<OperatorSessions>,
        tracker: TaskTracker,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            publisher,
            rewriter,
            sessions,
            tracker,
            shutdown,
        })
    }

    pub fn rewrite_enabled(&self) -> bool {
        self.rewriter.is_enabled()
    }

    /// Most recent posts, newest first.
    pub async fn list(&self, limit: usize) -> Result<Vec<Post>, RelayError> {
        Ok(self.db.list_posts(limit).await?)
    }

    async fn load(&self, post_id: i64) -> Result<(Post, Vec<MediaItem>), RelayError> {
        let post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or_else(|| RelayError::post_not_found(post_id))?;
        let items = self.db.list_media_items(post_id).await?;
        Ok((post, items))
    }

    /// Show the post to the operator, replacing any preview already on screen.
    pub async fn open(&self, admin_id: i64, post_id: i64) -> Result<(), RelayError> {
        let (post, items) = self.load(post_id).await?;
        self.show_preview(admin_id, &post, &items).await
    }

    /// Start a rewrite in the background. Progress and failures are reported
    /// to the operator directly.
    pub fn request_rewrite(
        self: &Arc<Self>,
        admin_id: i64,
        post_id: i64,
        mode: RewriteMode,
    ) -> Result<(), RelayError> {
        if !self.rewriter.is_enabled() {
            return Err(RelayError::RewriteDisabled);
        }

        let this = Arc::clone(self);
        let cancel = self.shutdown.child_token();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(post_id, "Rewrite abandoned on shutdown");
                }
                result = this.rewrite_now(admin_id, post_id, mode) => {
                    if let Err(e) = result {
                        error!(post_id, mode = %mode, "Rewrite job failed: {e}");
                        if let Err(e) = this
                            .publisher
                            .messenger()
                            .send_text(admin_id, e.user_message(), None)
                            .await
                        {
                            warn!(admin_id, "Failed to report rewrite failure: {e}");
                        }
                    }
                }
            }
        });
        Ok(())
    }

    /// Rewrite the original text, store it and show the rewritten preview.
    pub async fn rewrite_now(
        &self,
        admin_id: i64,
        post_id: i64,
        mode: RewriteMode,
    ) -> Result<Post, RelayError> {
        let (mut post, items) = self.load(post_id).await?;
        let rewritten = self.rewriter.rewrite(&post.original_text, mode).await?;

        // The post may have been published or deleted while the model was busy.
        if !self.db.set_rewritten_text(post_id, Some(&rewritten)).await? {
            return Err(RelayError::post_not_found(post_id));
        }
        post.rewritten_text = Some(rewritten);
        info!(post_id, mode = %mode, "Post rewritten");

        self.show_preview(admin_id, &post, &items).await?;
        Ok(post)
    }

    /// Drop the rewrite and show the original again.
    pub async fn cancel(&self, admin_id: i64, post_id: i64) -> Result<(), RelayError> {
        if !self.db.set_rewritten_text(post_id, None).await? {
            return Err(RelayError::post_not_found(post_id));
        }
        let (post, items) = self.load(post_id).await?;
        self.show_preview(admin_id, &post, &items).await
    }

    /// Send the post to the active target, then remove it.
    ///
    /// Storage is left untouched unless the send succeeds.
    pub async fn publish(&self, admin_id: i64, post_id: i64) -> Result<usize, RelayError> {
        let (post, items) = self.load(post_id).await?;
        let target = self
            .db
            .active_target()
            .await?
            .ok_or(RelayError::NoTargetConfigured)?;

        let sent = match self.publisher.deliver(target.chat_id, &post, &items).await {
            Ok(sent) => sent,
            Err(e) => {
                error!(post_id, target = target.chat_id, "Publish failed: {e}");
                return Err(e.into());
            }
        };

        self.db.delete_post(post_id).await?;
        self.clear_preview(admin_id).await;
        info!(
            post_id,
            target = target.chat_id,
            messages = sent.len(),
            rewritten = post.is_rewritten(),
            "Post published"
        );
        Ok(sent.len())
    }

    /// Discard the post without publishing.
    pub async fn delete(&self, admin_id: i64, post_id: i64) -> Result<(), RelayError> {
        let deleted = self.db.delete_post(post_id).await?;
        self.clear_preview(admin_id).await;
        if !deleted {
            return Err(RelayError::post_not_found(post_id));
        }
        info!(post_id, "Post deleted");
        Ok(())
    }

    async fn show_preview(
        &self,
        admin_id: i64,
        post: &Post,
        items: &[MediaItem],
    ) -> Result<(), RelayError> {
        self.clear_preview(admin_id).await;

        let preview_ids = self.publisher.deliver(admin_id, post, items).await?;

        let (header, keyboard) = if post.is_rewritten() {
            (
                format!("👆 <b>Rewritten post #{}</b>\n\nPublish?", post.id),
                keyboards::preview_actions(post.id),
            )
        } else {
            (
                format!("👆 <b>Original post #{}</b>\n\nChoose an action:", post.id),
                keyboards::post_actions(post.id),
            )
        };
        let control_id = self
            .publisher
            .messenger()
            .send_text(admin_id, &header, Some(&keyboard))
            .await?;

        self.sessions
            .set_preview(admin_id, preview_ids, vec![control_id])
            .await;
        Ok(())
    }

    /// Remove the operator's current preview messages. Failures are ignored.
    pub async fn clear_preview(&self, admin_id: i64) {
        for message_id in self.sessions.take_preview(admin_id).await {
            if let Err(e) = self
                .publisher
                .messenger()
                .delete_message(admin_id, message_id)
                .await
            {
                debug!(admin_id, message_id, "Preview message already gone: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{ChannelError, LlmError};
    use crate::llm::{GenerationRequest, TextGenerator};
    use crate::posts::model::{MediaKind, MediaRef, NewMediaItem, NewPost};
    use crate::settings::SettingsStore;
    use crate::store::LibSqlBackend;
    use crate::telegram::testing::{RecordingMessenger, Sent};
    use crate::telegram::{MessageHistory, SourceMessage};

    const ADMIN: i64 = 42;
    const SOURCE: i64 = -1001;
    const TARGET: i64 = -2002;

    struct Fixed(&'static str);

    #[async_trait]
    impl TextGenerator for Fixed {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }
    }

    struct Harness {
        service: Arc<PostService>,
        db: Arc<dyn Database>,
        messenger: Arc<RecordingMessenger>,
        history: Arc<MessageHistory>,
        sessions: Arc<OperatorSessions>,
        tracker: TaskTracker,
    }

    async fn harness(generator: Option<Arc<dyn TextGenerator>>) -> Harness {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let messenger = Arc::new(RecordingMessenger::new());
        let history = Arc::new(MessageHistory::default());
        let sessions = Arc::new(OperatorSessions::new());
        let tracker = TaskTracker::new();
        let rewriter = Arc::new(RewriteService::new(
            generator,
            SettingsStore::new(Arc::clone(&db)),
        ));
        let service = PostService::new(
            Arc::clone(&db),
            Publisher::new(messenger.clone(), history.clone()),
            rewriter,
            sessions.clone(),
            tracker.clone(),
            CancellationToken::new(),
        );
        Harness {
            service,
            db,
            messenger,
            history,
            sessions,
            tracker,
        }
    }

    async fn photo_post(h: &Harness, text: &str) -> i64 {
        h.history
            .record(SourceMessage {
                chat_id: SOURCE,
                message_id: 5,
                group_id: None,
                text: text.to_string(),
                media: Some(MediaRef {
                    kind: MediaKind::Photo,
                    file_id: "photo-5".into(),
                }),
            })
            .await;
        h.db.insert_post(&NewPost {
            source_chat_id: SOURCE,
            source_message_id: 5,
            media_group_id: None,
            original_text: text.to_string(),
            media: vec![NewMediaItem {
                kind: MediaKind::Photo,
                message_id: 5,
                file_id: Some("photo-5".into()),
            }],
        })
        .await
        .unwrap()
        .unwrap()
    }

    #[tokio::test]
    async fn open_shows_preview_and_controls() {
        let h = harness(None).await;
        let id = photo_post(&h, "Hello").await;
        h.service.open(ADMIN, id).await.unwrap();

        let sent = h.messenger.sent_to(ADMIN);
        assert_eq!(sent.len(), 2);
        assert!(matches!(&sent[0], Sent::Media { caption: Some(c), .. } if c == "Hello"));
        let Sent::Text { keyboard: Some(kb), .. } = &sent[1] else {
            panic!("control message expected");
        };
        assert!(kb.callback_data().contains(&format!("p:{id}:rewrite").as_str()));

        // Opening again replaces the old preview.
        h.messenger.clear();
        h.service.open(ADMIN, id).await.unwrap();
        let deletes = h
            .messenger
            .sent()
            .iter()
            .filter(|s| matches!(s, Sent::Delete { .. }))
            .count();
        assert_eq!(deletes, 2);
    }

    #[tokio::test]
    async fn open_missing_post_is_not_found() {
        let h = harness(None).await;
        assert!(matches!(
            h.service.open(ADMIN, 99).await,
            Err(RelayError::NotFound { entity: "Post", id: 99 })
        ));
    }

    #[tokio::test]
    async fn rewrite_then_cancel_restores_original() {
        let h = harness(Some(Arc::new(Fixed("Hello WORLD")))).await;
        let id = photo_post(&h, "Hello **world**").await;

        let post = h.service.rewrite_now(ADMIN, id, RewriteMode::Standard).await.unwrap();
        assert_eq!(post.rewritten_text.as_deref(), Some("Hello WORLD"));

        h.service.cancel(ADMIN, id).await.unwrap();
        let stored = h.db.get_post(id).await.unwrap().unwrap();
        assert_eq!(stored.rewritten_text, None);
        assert_eq!(stored.original_text, "Hello **world**");
    }

    #[tokio::test]
    async fn rewrite_disabled_without_generator() {
        let h = harness(None).await;
        let id = photo_post(&h, "text").await;
        assert!(matches!(
            h.service.request_rewrite(ADMIN, id, RewriteMode::Short),
            Err(RelayError::RewriteDisabled)
        ));
    }

    #[tokio::test]
    async fn background_rewrite_shows_preview() {
        let h = harness(Some(Arc::new(Fixed("Rewritten")))).await;
        let id = photo_post(&h, "text").await;
        h.service.request_rewrite(ADMIN, id, RewriteMode::Creative).unwrap();

        h.tracker.close();
        tokio::time::timeout(Duration::from_secs(5), h.tracker.wait())
            .await
            .unwrap();

        let stored = h.db.get_post(id).await.unwrap().unwrap();
        assert_eq!(stored.rewritten_text.as_deref(), Some("Rewritten"));
        assert!(h.messenger.sent_to(ADMIN).iter().any(
            |s| matches!(s, Sent::Media { caption: Some(c), .. } if c == "Rewritten")
        ));
    }

    #[tokio::test]
    async fn background_rewrite_failure_is_reported() {
        let h = harness(Some(Arc::new(Fixed("unused")))).await;
        h.service.request_rewrite(ADMIN, 404, RewriteMode::Standard).unwrap();
        h.tracker.close();
        h.tracker.wait().await;

        assert!(matches!(
            &h.messenger.sent_to(ADMIN)[..],
            [Sent::Text { html, .. }] if html == "❌ Post not found"
        ));
    }

    #[tokio::test]
    async fn publish_without_target_changes_nothing() {
        let h = harness(None).await;
        let id = photo_post(&h, "text").await;
        assert!(matches!(
            h.service.publish(ADMIN, id).await,
            Err(RelayError::NoTargetConfigured)
        ));
        assert!(h.db.get_post(id).await.unwrap().is_some());
        assert_eq!(h.db.list_media_items(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_publish_keeps_post_for_retry() {
        let h = harness(None).await;
        h.db.replace_target(TARGET, "Target").await.unwrap();
        let id = photo_post(&h, "text").await;

        h.messenger.fail_chat(TARGET);
        assert!(matches!(
            h.service.publish(ADMIN, id).await,
            Err(RelayError::ExternalSendFailure(_))
        ));
        assert!(h.db.get_post(id).await.unwrap().is_some());
        assert_eq!(h.db.list_media_items(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn publish_keeps_album_whose_media_is_gone() {
        let h = harness(None).await;
        h.db.replace_target(TARGET, "Target").await.unwrap();
        // Captured before file ids were stored, and the history is empty as after a restart.
        let id = h
            .db
            .insert_post(&NewPost {
                source_chat_id: SOURCE,
                source_message_id: 10,
                media_group_id: Some("g".into()),
                original_text: "album caption".into(),
                media: [10, 11]
                    .into_iter()
                    .map(|message_id| NewMediaItem {
                        kind: MediaKind::Photo,
                        message_id,
                        file_id: None,
                    })
                    .collect(),
            })
            .await
            .unwrap()
            .unwrap();

        let err = h.service.publish(ADMIN, id).await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::ExternalSendFailure(ChannelError::MediaUnavailable { .. })
        ));
        assert!(h.messenger.sent_to(TARGET).is_empty());
        assert!(h.db.get_post(id).await.unwrap().is_some());
        assert_eq!(h.db.list_media_items(id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn captured_album_publishes_without_history() {
        let h = harness(None).await;
        h.db.replace_target(TARGET, "Target").await.unwrap();
        let id = h
            .db
            .insert_post(&NewPost {
                source_chat_id: SOURCE,
                source_message_id: 10,
                media_group_id: Some("g".into()),
                original_text: "album caption".into(),
                media: [10, 11]
                    .into_iter()
                    .map(|message_id| NewMediaItem {
                        kind: MediaKind::Photo,
                        message_id,
                        file_id: Some(format!("photo-{message_id}")),
                    })
                    .collect(),
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(h.service.publish(ADMIN, id).await.unwrap(), 2);
        assert!(matches!(
            &h.messenger.sent_to(TARGET)[..],
            [Sent::Album { media, caption: Some(c), .. }] if media.len() == 2 && c == "album caption"
        ));
        assert!(h.db.get_post(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn publish_sends_and_removes_post() {
        let h = harness(None).await;
        h.db.replace_target(TARGET, "Target").await.unwrap();
        let id = photo_post(&h, "text").await;
        h.service.open(ADMIN, id).await.unwrap();

        assert_eq!(h.service.publish(ADMIN, id).await.unwrap(), 1);
        assert!(h.db.get_post(id).await.unwrap().is_none());
        assert!(h.db.list_media_items(id).await.unwrap().is_empty());
        assert!(h.sessions.take_preview(ADMIN).await.is_empty());
        assert_eq!(h.messenger.sent_to(TARGET).len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_post_and_preview() {
        let h = harness(None).await;
        let id = photo_post(&h, "text").await;
        h.service.open(ADMIN, id).await.unwrap();
        h.service.delete(ADMIN, id).await.unwrap();

        assert!(h.db.get_post(id).await.unwrap().is_none());
        assert!(h.messenger.sent_to(TARGET).is_empty());
        assert!(matches!(
            h.service.delete(ADMIN, id).await,
            Err(RelayError::NotFound { .. })
        ));
    }
}
