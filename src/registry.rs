//! Channel registry: cached source lookup plus every channel mutation.
//!
//! Sources are cached under both their Bot API id and their raw id, so a
//! lookup succeeds with either form. The cache is rebuilt after `ttl` or after
//! any mutation made through the registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::chat_id;
use crate::error::{DatabaseError, RelayError};
use crate::store::{Channel, ChannelRole, Database};

#[derive(Default)]
struct SourceCache {
    by_id: HashMap<i64, Channel>,
    refreshed_at: Option<Instant>,
}

impl SourceCache {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.refreshed_at.is_some_and(|at| at.elapsed() < ttl)
    }
}

pub struct ChannelRegistry {
    db: Arc<dyn Database>,
    ttl: Duration,
    cache: RwLock<SourceCache>,
}

impl ChannelRegistry {
    pub fn new(db: Arc<dyn Database>, ttl: Duration) -> Self {
        Self {
            db,
            ttl,
            cache: RwLock::new(SourceCache::default()),
        }
    }

    /// Active source for a chat id in either form.
    pub async fn lookup(&self, chat_id: i64) -> Option<Channel> {
        if !self.cache.read().await.is_fresh(self.ttl) {
            self.refresh().await;
        }
        self.cache.read().await.by_id.get(&chat_id).cloned()
    }

    /// Rebuild the cache from storage. On failure the old map stays in place.
    pub async fn refresh(&self) {
        let sources = match self.db.list_active_sources().await {
            Ok(sources) => sources,
            Err(e) => {
                warn!("Channel registry refresh failed, serving stale cache: {e}");
                return;
            }
        };

        let mut by_id = HashMap::with_capacity(sources.len() * 2);
        for source in &sources {
            for key in chat_id::lookup_keys(source.chat_id) {
                by_id.insert(key, source.clone());
            }
        }

        let mut cache = self.cache.write().await;
        cache.by_id = by_id;
        cache.refreshed_at = Some(Instant::now());
        info!(sources = sources.len(), "Sources cache updated");
    }

    /// Force a rebuild on the next lookup.
    pub async fn invalidate(&self) {
        self.cache.write().await.refreshed_at = None;
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub async fn get(&self, id: i64) -> Result<Channel, RelayError> {
        self.db
            .get_channel(id)
            .await?
            .ok_or_else(|| RelayError::channel_not_found(id))
    }

    /// All sources, active or not.
    pub async fn sources(&self) -> Result<Vec<Channel>, RelayError> {
        Ok(self.db.list_channels(ChannelRole::Source).await?)
    }

    pub async fn active_target(&self) -> Result<Option<Channel>, RelayError> {
        Ok(self.db.active_target().await?)
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Register a source. Returns the channel and whether it was newly added.
    pub async fn add_source(&self, chat_id: i64, title: &str) -> Result<(Channel, bool), RelayError> {
        let chat_id = chat_id::canonicalize(chat_id).ok_or(RelayError::InvalidChatId { chat_id })?;
        if let Some(existing) = self.db.get_channel_by_chat_id(chat_id).await? {
            if existing.role == ChannelRole::Target {
                return Err(DatabaseError::Constraint(format!(
                    "chat {chat_id} is the target channel"
                ))
                .into());
            }
            return Ok((existing, false));
        }

        let channel = self
            .db
            .insert_channel(chat_id, ChannelRole::Source, title)
            .await?;
        self.invalidate().await;
        info!(channel_id = channel.id, chat_id, title, "Source added");
        Ok((channel, true))
    }

    /// Make `chat_id` the only target.
    pub async fn set_target(&self, chat_id: i64, title: &str) -> Result<Channel, RelayError> {
        let chat_id = chat_id::canonicalize(chat_id).ok_or(RelayError::InvalidChatId { chat_id })?;
        let channel = self.db.replace_target(chat_id, title).await?;
        self.invalidate().await;
        Ok(channel)
    }

    /// Flip a channel's active flag. Returns the updated channel.
    pub async fn toggle(&self, id: i64) -> Result<Channel, RelayError> {
        let mut channel = self.get(id).await?;
        channel.is_active = !channel.is_active;
        if !self.db.set_channel_active(id, channel.is_active).await? {
            return Err(RelayError::channel_not_found(id));
        }
        self.invalidate().await;
        info!(channel_id = id, active = channel.is_active, "Channel toggled");
        Ok(channel)
    }

    pub async fn rename(&self, id: i64, title: &str) -> Result<(), RelayError> {
        if !self.db.rename_channel(id, title).await? {
            return Err(RelayError::channel_not_found(id));
        }
        self.invalidate().await;
        Ok(())
    }

    /// Delete a channel. Returns what was deleted.
    pub async fn remove(&self, id: i64) -> Result<Channel, RelayError> {
        let channel = self.get(id).await?;
        if !self.db.delete_channel(id).await? {
            return Err(RelayError::channel_not_found(id));
        }
        self.invalidate().await;
        info!(channel_id = id, chat_id = channel.chat_id, "Channel removed");
        Ok(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    async fn registry(ttl: Duration) -> (ChannelRegistry, Arc<dyn Database>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        (ChannelRegistry::new(Arc::clone(&db), ttl), db)
    }

    #[tokio::test]
    async fn lookup_by_either_id_form() {
        let (reg, _db) = registry(Duration::from_secs(30)).await;
        let (channel, created) = reg.add_source(1234567890, "News").await.unwrap();
        assert!(created);
        assert_eq!(channel.chat_id, -1001234567890);

        assert_eq!(reg.lookup(-1001234567890).await.unwrap().id, channel.id);
        assert_eq!(reg.lookup(1234567890).await.unwrap().id, channel.id);
        assert!(reg.lookup(-1009999).await.is_none());
    }

    #[tokio::test]
    async fn adding_twice_returns_existing() {
        let (reg, _db) = registry(Duration::from_secs(30)).await;
        let (first, _) = reg.add_source(-1001, "A").await.unwrap();
        let (second, created) = reg.add_source(-1001, "A again").await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn cache_serves_until_invalidated() {
        let (reg, db) = registry(Duration::from_secs(3600)).await;
        assert!(reg.lookup(-1001).await.is_none());

        // Written behind the registry's back: not visible until invalidation.
        db.insert_channel(-1001, ChannelRole::Source, "Direct").await.unwrap();
        assert!(reg.lookup(-1001).await.is_none());

        reg.invalidate().await;
        assert!(reg.lookup(-1001).await.is_some());
    }

    #[tokio::test]
    async fn zero_ttl_always_refreshes() {
        let (reg, db) = registry(Duration::ZERO).await;
        assert!(reg.lookup(-1001).await.is_none());
        db.insert_channel(-1001, ChannelRole::Source, "Direct").await.unwrap();
        assert!(reg.lookup(-1001).await.is_some());
    }

    #[tokio::test]
    async fn toggle_and_remove_invalidate() {
        let (reg, _db) = registry(Duration::from_secs(3600)).await;
        let (channel, _) = reg.add_source(-1001, "A").await.unwrap();
        assert!(reg.lookup(-1001).await.is_some());

        let toggled = reg.toggle(channel.id).await.unwrap();
        assert!(!toggled.is_active);
        assert!(reg.lookup(-1001).await.is_none());

        reg.toggle(channel.id).await.unwrap();
        assert!(reg.lookup(-1001).await.is_some());

        reg.remove(channel.id).await.unwrap();
        assert!(reg.lookup(-1001).await.is_none());
        assert!(matches!(
            reg.remove(channel.id).await,
            Err(RelayError::NotFound { entity: "Channel", .. })
        ));
    }

    #[tokio::test]
    async fn rename_shows_in_lookup() {
        let (reg, _db) = registry(Duration::from_secs(3600)).await;
        let (channel, _) = reg.add_source(-1001, "Old").await.unwrap();
        reg.lookup(-1001).await;
        reg.rename(channel.id, "New").await.unwrap();
        assert_eq!(reg.lookup(-1001).await.unwrap().title, "New");
    }

    #[tokio::test]
    async fn target_and_source_do_not_mix() {
        let (reg, _db) = registry(Duration::from_secs(30)).await;
        reg.set_target(-2001, "Target").await.unwrap();
        assert!(reg.add_source(-2001, "Oops").await.is_err());
        assert!(reg.lookup(-2001).await.is_none());

        reg.add_source(-1001, "Src").await.unwrap();
        assert!(reg.set_target(-1001, "Oops").await.is_err());
        assert_eq!(reg.active_target().await.unwrap().unwrap().chat_id, -2001);
    }

    #[tokio::test]
    async fn out_of_range_ids_are_refused() {
        let (reg, db) = registry(Duration::from_secs(30)).await;
        assert!(matches!(
            reg.add_source(i64::MIN, "Bad").await,
            Err(RelayError::InvalidChatId { chat_id: i64::MIN })
        ));
        assert!(matches!(
            reg.set_target(i64::MIN, "Bad").await,
            Err(RelayError::InvalidChatId { .. })
        ));
        assert!(db.list_channels(ChannelRole::Source).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stored_extreme_id_does_not_break_lookups() {
        let (reg, db) = registry(Duration::from_secs(30)).await;
        db.insert_channel(i64::MIN, ChannelRole::Source, "Legacy").await.unwrap();
        reg.add_source(-1001, "News").await.unwrap();

        assert_eq!(reg.lookup(-1001).await.unwrap().title, "News");
        assert_eq!(reg.lookup(i64::MIN).await.unwrap().title, "Legacy");
    }
}
