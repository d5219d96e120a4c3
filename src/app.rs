//! Wiring and the main event loop.
//!
//! Updates are long-polled by one task. Each update is handled in its own
//! tracked task so a failing handler never affects the others. On Ctrl+C the
//! shutdown token is cancelled, pending albums flush, and in-flight tasks get
//! a grace period to finish.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::error::Error;
use crate::llm::{AnthropicClient, TextGenerator};
use crate::monitor::{AlbumAggregator, ChannelMonitor, Ingest};
use crate::operator::{OperatorHandler, OperatorSessions};
use crate::posts::{Notifier, PostService, Publisher};
use crate::registry::ChannelRegistry;
use crate::rewrite::RewriteService;
use crate::settings::SettingsStore;
use crate::store::{Database, LibSqlBackend};
use crate::telegram::{MessageHistory, Messenger, TelegramBot, Update, poller};

/// Sends each update to the component that owns it.
pub struct UpdateRouter {
    monitor: ChannelMonitor,
    operator: OperatorHandler,
}

impl UpdateRouter {
    pub fn new(monitor: ChannelMonitor, operator: OperatorHandler) -> Self {
        Self { monitor, operator }
    }

    pub async fn route(&self, update: Update) {
        if let Some(post) = update.channel_post {
            self.monitor.handle_channel_post(&post).await;
        } else if let Some(query) = update.callback_query {
            self.operator.handle_callback(&query).await;
        } else if let Some(msg) = update.message {
            self.operator.handle_message(&msg).await;
        } else {
            debug!(update_id = update.update_id, "Ignoring update without payload");
        }
    }
}

/// Every long-lived component, built from the config.
pub struct Relay {
    config: RelayConfig,
    bot: Arc<TelegramBot>,
    router: Arc<UpdateRouter>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Relay {
    pub async fn build(config: RelayConfig) -> Result<Self, Error> {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);
        let bot = Arc::new(TelegramBot::new(config.bot_token.clone())?);
        let messenger: Arc<dyn Messenger> = bot.clone();

        let tracker = TaskTracker::new();
        let shutdown = CancellationToken::new();

        let history = Arc::new(MessageHistory::default());
        let registry = Arc::new(ChannelRegistry::new(Arc::clone(&db), config.registry_ttl));
        let settings = SettingsStore::new(Arc::clone(&db));
        let sessions = Arc::new(OperatorSessions::new());

        let generator: Option<Arc<dyn TextGenerator>> = match &config.anthropic_api_key {
            Some(key) => Some(Arc::new(AnthropicClient::new(
                key.clone(),
                &config.anthropic_base_url,
            )?)),
            None => None,
        };
        let rewriter = Arc::new(RewriteService::new(generator, settings.clone()));

        let ingest = Arc::new(Ingest::new(
            Arc::clone(&db),
            Arc::clone(&registry),
            Notifier::new(Arc::clone(&messenger), config.admin_ids.clone()),
        ));
        let aggregator = AlbumAggregator::new(
            ingest,
            config.album_debounce,
            tracker.clone(),
            shutdown.clone(),
        );
        let monitor = ChannelMonitor::new(Arc::clone(&registry), history.clone(), aggregator);

        let posts = PostService::new(
            Arc::clone(&db),
            Publisher::new(Arc::clone(&messenger), history),
            rewriter,
            Arc::clone(&sessions),
            tracker.clone(),
            shutdown.clone(),
        );
        let operator = OperatorHandler::new(
            messenger,
            posts,
            registry,
            settings,
            sessions,
            config.admin_ids.iter().copied(),
        );

        Ok(Self {
            config,
            bot,
            router: Arc::new(UpdateRouter::new(monitor, operator)),
            tracker,
            shutdown,
        })
    }

    /// Poll and handle updates until Ctrl+C.
    pub async fn run(self) -> Result<(), Error> {
        let username = self.bot.get_me().await?;
        info!(
            bot = %username,
            operators = self.config.admin_ids.len(),
            rewrite = self.config.rewrite_enabled(),
            "Relay ready and listening"
        );

        let mut updates = poller::start(Arc::clone(&self.bot), self.shutdown.clone());

        loop {
            let update = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl+C received, shutting down...");
                    break;
                }
                update = updates.next() => match update {
                    Some(update) => update,
                    None => {
                        warn!("Update stream ended, shutting down...");
                        break;
                    }
                },
            };

            let router = Arc::clone(&self.router);
            self.tracker.spawn(async move {
                let update_id = update.update_id;
                router.route(update).await;
                debug!(update_id, "Update handled");
            });
        }

        self.drain().await;
        Ok(())
    }

    async fn drain(&self) {
        self.shutdown.cancel();
        self.tracker.close();

        let grace = self.config.shutdown_grace;
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => info!("All tasks finished"),
            Err(_) => error!(
                remaining = self.tracker.len(),
                "Tasks still running after {grace:?}, exiting anyway"
            ),
        }
    }
}
