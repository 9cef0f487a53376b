use crate::{
    error::AppResult,
    models::{ItemId, RecommendationEntry, Strategy},
};

/// Durable mapping of (item, strategy) to a precomputed recommendation list
///
/// The store never computes anything. Only the precomputation pipeline writes
/// to it; the dispatcher only reads. A missing key is `Ok(None)`, not an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn get(
        &self,
        item_id: ItemId,
        strategy: Strategy,
    ) -> AppResult<Option<RecommendationEntry>>;

    /// Inserts or overwrites the entry for (item, strategy)
    async fn put(
        &self,
        item_id: ItemId,
        strategy: Strategy,
        entry: RecommendationEntry,
    ) -> AppResult<()>;

    /// Removes every entry of a strategy, returning how many were removed
    async fn clear(&self, strategy: Strategy) -> AppResult<u64>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
