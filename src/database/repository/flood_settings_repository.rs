//! Antiflood settings repository with read caching.
//!
//! Reads fall through to the backend and return the built-in defaults when a
//! chat has no stored record. Writes are field-level upserts and invalidate
//! the cached copy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use moka::sync::Cache;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::UpdateOptions;
use mongodb::Collection;
use teloxide::types::ChatId;
use tracing::debug;

use crate::database::models::{ChatFloodConfig, FloodSettingsUpdate};
use crate::database::Database;

/// Key-value store holding one antiflood record per chat.
#[async_trait]
pub trait FloodSettingsBackend: Send + Sync {
    /// Stored record for a chat, if any.
    async fn find(&self, chat_id: ChatId) -> Result<Option<ChatFloodConfig>>;

    /// Merge the present fields into the chat's record, creating it if needed.
    async fn upsert(&self, chat_id: ChatId, update: &FloodSettingsUpdate) -> Result<()>;
}

/// MongoDB backend, collection `antiflood`.
pub struct MongoFloodSettings {
    collection: Collection<ChatFloodConfig>,
}

impl MongoFloodSettings {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("antiflood"),
        }
    }
}

/// Build the `$set` document for an update.
fn set_document(update: &FloodSettingsUpdate) -> Result<Document> {
    let mut set = Document::new();

    if let Some(limit) = update.limit {
        set.insert("limit", i64::from(limit));
    }
    if let Some(action) = update.action {
        set.insert("action", action.as_str());
    }
    if let Some(duration) = &update.duration {
        let value = match duration {
            Some(d) => Bson::String(d.clone()),
            None => Bson::Null,
        };
        set.insert("duration", value);
    }
    if let Some(timer) = &update.timer {
        set.insert("timer", mongodb::bson::to_bson(timer)?);
    }
    if let Some(clear) = update.clear_on_violation {
        set.insert("clear", clear);
    }

    Ok(set)
}

#[async_trait]
impl FloodSettingsBackend for MongoFloodSettings {
    async fn find(&self, chat_id: ChatId) -> Result<Option<ChatFloodConfig>> {
        let filter = doc! { "chat_id": chat_id.0 };
        let result = self.collection.find_one(filter).await?;
        debug!("DB get antiflood settings for {}: {:?}", chat_id, result.is_some());
        Ok(result)
    }

    async fn upsert(&self, chat_id: ChatId, update: &FloodSettingsUpdate) -> Result<()> {
        let set = set_document(update)?;
        if set.is_empty() {
            return Ok(());
        }

        let filter = doc! { "chat_id": chat_id.0 };
        let options = UpdateOptions::builder().upsert(true).build();

        self.collection
            .update_one(filter, doc! { "$set": set })
            .with_options(options)
            .await?;

        debug!("Upserted antiflood settings for {}", chat_id);
        Ok(())
    }
}

/// Antiflood settings store used by the event handler and the commands.
pub struct FloodSettingsRepository {
    backend: Arc<dyn FloodSettingsBackend>,
    cache: Option<Cache<i64, ChatFloodConfig>>,
    /// Bumped after every write; a read only caches what it fetched if no
    /// write finished in between.
    writes: AtomicU64,
}

impl FloodSettingsRepository {
    /// Create a repository; `cache_ttl` of zero disables caching.
    pub fn new(backend: Arc<dyn FloodSettingsBackend>, cache_ttl: Duration) -> Self {
        let cache = (!cache_ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(10_000)
                .time_to_live(cache_ttl)
                .build()
        });

        Self {
            backend,
            cache,
            writes: AtomicU64::new(0),
        }
    }

    /// Settings for a chat, defaults when nothing is stored.
    pub async fn get(&self, chat_id: ChatId) -> Result<ChatFloodConfig> {
        if let Some(cache) = &self.cache
            && let Some(settings) = cache.get(&chat_id.0)
        {
            return Ok(settings);
        }

        let generation = self.writes.load(Ordering::SeqCst);

        let settings = self
            .backend
            .find(chat_id)
            .await?
            .map(|mut s| {
                s.chat_id = chat_id.0;
                s
            })
            .unwrap_or_else(|| ChatFloodConfig::new(chat_id.0));

        if let Some(cache) = &self.cache {
            cache.insert(chat_id.0, settings.clone());
            // A write landed while we were reading; our copy may predate it
            if self.writes.load(Ordering::SeqCst) != generation {
                cache.invalidate(&chat_id.0);
            }
        }

        Ok(settings)
    }

    /// Merge `update` into the stored settings.
    pub async fn set(&self, chat_id: ChatId, update: FloodSettingsUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }

        self.backend.upsert(chat_id, &update).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);

        if let Some(cache) = &self.cache {
            cache.invalidate(&chat_id.0);
        }

        debug!("Updated antiflood settings for {}: {:?}", chat_id, update);
        Ok(())
    }
}
