use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;

use crate::db::store::RecommendationStore;
use crate::error::AppError;
use crate::error::AppResult;
use crate::models::{ItemId, RecommendationEntry, Strategy};

/// Keys are deleted in batches of this size when a strategy is cleared
const CLEAR_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Recommendation { strategy: Strategy, item_id: ItemId },
    StrategyPattern(Strategy),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Recommendation { strategy, item_id } => {
                write!(f, "rec:{}:{}", strategy, item_id)
            }
            CacheKey::StrategyPattern(strategy) => write!(f, "rec:{}:*", strategy),
        }
    }
}

/// Creates a Redis client for the recommendation store
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Recommendation store backed by Redis
///
/// Entries are JSON-encoded under `rec:{strategy}:{item_id}` and never expire;
/// they stay until the pipeline overwrites or clears them.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connects through a connection manager that reconnects on failure
    pub async fn connect(redis_client: Client) -> AppResult<Self> {
        let conn = ConnectionManager::new(redis_client).await?;
        tracing::info!("Connected to Redis recommendation store");
        Ok(Self { conn })
    }
}

#[async_trait::async_trait]
impl RecommendationStore for RedisStore {
    async fn get(
        &self,
        item_id: ItemId,
        strategy: Strategy,
    ) -> AppResult<Option<RecommendationEntry>> {
        let key = CacheKey::Recommendation { strategy, item_id };
        let mut conn = self.conn.clone();
        let cached: Option<String> = conn.get(key.to_string()).await?;

        match cached {
            Some(json) => {
                let entry = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                tracing::debug!(%key, "Cache hit");
                Ok(Some(entry))
            }
            None => {
                tracing::debug!(%key, "Cache miss");
                Ok(None)
            }
        }
    }

    async fn put(
        &self,
        item_id: ItemId,
        strategy: Strategy,
        entry: RecommendationEntry,
    ) -> AppResult<()> {
        let key = CacheKey::Recommendation { strategy, item_id };
        let json = serde_json::to_string(&entry)
            .map_err(|e| AppError::Internal(format!("Cache serialization error: {}", e)))?;

        let mut conn = self.conn.clone();
        let _: () = conn.set(key.to_string(), json).await?;
        Ok(())
    }

    async fn clear(&self, strategy: Strategy) -> AppResult<u64> {
        let pattern = CacheKey::StrategyPattern(strategy).to_string();
        let mut conn = self.conn.clone();

        let keys: Vec<String> = {
            let mut scan = self.conn.clone();
            let mut iter = scan.scan_match::<_, String>(&pattern).await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        let mut removed = 0;
        for batch in keys.chunks(CLEAR_BATCH_SIZE) {
            let count: u64 = conn.del(batch).await?;
            removed += count;
        }

        tracing::info!(%strategy, removed, "Cleared stored recommendations");
        Ok(removed)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
