//! Per-operator conversation state.
//!
//! Tracks the messages making up the operator's current post preview so they
//! can be cleaned up, and what kind of input the bot is waiting for next.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::rewrite::RewriteMode;

/// Input the bot expects from the operator's next message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingInput {
    /// A forwarded post from a channel to monitor.
    SourceForward,
    /// A forwarded post from the channel to publish into.
    TargetForward,
    Prompt(RewriteMode),
    Model,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct AdminSession {
    preview_ids: Vec<i64>,
    control_ids: Vec<i64>,
    pending: Option<PendingInput>,
}

#[derive(Default)]
pub struct OperatorSessions {
    sessions: Mutex<HashMap<i64, AdminSession>>,
}

impl OperatorSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the preview now on screen.
    pub async fn set_preview(&self, admin_id: i64, preview_ids: Vec<i64>, control_ids: Vec<i64>) {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(admin_id).or_default();
        session.preview_ids = preview_ids;
        session.control_ids = control_ids;
    }

    /// Forget the current preview and return its message ids, deduplicated.
    pub async fn take_preview(&self, admin_id: i64) -> Vec<i64> {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(&admin_id) else {
            return Vec::new();
        };
        let mut ids = std::mem::take(&mut session.preview_ids);
        for id in std::mem::take(&mut session.control_ids) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    pub async fn set_pending(&self, admin_id: i64, pending: Option<PendingInput>) {
        self.sessions.lock().await.entry(admin_id).or_default().pending = pending;
    }

    pub async fn pending(&self, admin_id: i64) -> Option<PendingInput> {
        self.sessions
            .lock()
            .await
            .get(&admin_id)
            .and_then(|s| s.pending)
    }

    /// Clear and return the pending input.
    pub async fn take_pending(&self, admin_id: i64) -> Option<PendingInput> {
        self.sessions
            .lock()
            .await
            .get_mut(&admin_id)
            .and_then(|s| s.pending.take())
    }
}
