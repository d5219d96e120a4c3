//! `getUpdates` long-polling loop exposed as a stream.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::telegram::api::TelegramBot;
use crate::telegram::types::Update;

/// Pause after a failed poll before trying again.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

pub type UpdateStream = Pin<Box<dyn Stream<Item = Update> + Send>>;

/// Start polling. The stream ends when `cancel` fires.
pub fn start(bot: Arc<TelegramBot>, cancel: CancellationToken) -> UpdateStream {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut offset: i64 = 0;
        tracing::info!("Telegram poller listening for updates...");

        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => break,
                batch = bot.get_updates(offset) => batch,
            };

            let updates = match batch {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!("Telegram poll error: {e}");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(ERROR_BACKOFF) => continue,
                    }
                }
            };

            for update in updates {
                // Advance offset past this update
                offset = next_offset(offset, update.update_id);
                if tx.send(update).is_err() {
                    tracing::info!("Telegram update receiver closed");
                    return;
                }
            }
        }

        tracing::info!("Telegram poller stopped");
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|update| (update, rx))
    });
    Box::pin(stream)
}

fn next_offset(current: i64, update_id: i64) -> i64 {
    current.max(update_id + 1)
}
