//! New-post notices for operators.

use std::sync::Arc;

use tracing::{info, warn};

use crate::format::escape_html;
use crate::operator::keyboards;
use crate::telegram::Messenger;

/// What an operator sees about a freshly captured post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostNotice {
    pub post_id: i64,
    pub source_title: String,
    pub text_chars: usize,
    pub media_count: usize,
}

impl PostNotice {
    pub fn render(&self) -> String {
        let mut html = format!(
            "📨 <b>New post #{}</b>\n📡 {}\n📝 {} chars",
            self.post_id,
            escape_html(&self.source_title),
            self.text_chars
        );
        if self.media_count > 0 {
            html.push_str(&format!("\n🖼 {} media", self.media_count));
        }
        html
    }
}

pub struct Notifier {
    messenger: Arc<dyn Messenger>,
    admin_ids: Vec<i64>,
}

impl Notifier {
    pub fn new(messenger: Arc<dyn Messenger>, admin_ids: Vec<i64>) -> Self {
        Self {
            messenger,
            admin_ids,
        }
    }

    /// Send the notice to every operator. Returns how many received it.
    pub async fn notify(&self, notice: &PostNotice) -> usize {
        let html = notice.render();
        let keyboard = keyboards::notice(notice.post_id);
        let mut delivered = 0;

        for &admin_id in &self.admin_ids {
            match self.messenger.send_text(admin_id, &html, Some(&keyboard)).await {
                Ok(_) => delivered += 1,
                Err(e) => warn!(admin_id, post_id = notice.post_id, "Failed to notify operator: {e}"),
            }
        }

        info!(post_id = notice.post_id, delivered, "Operators notified");
        delivered
    }
}
