use std::collections::HashMap;
use tokio::sync::RwLock;

use super::store::RecommendationStore;
use crate::{
    error::AppResult,
    models::{ItemId, RecommendationEntry, Strategy},
};

/// Process-local store used by tests and single-node deployments without Redis
#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<(Strategy, ItemId), RecommendationEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries stored for a strategy
    pub async fn count(&self, strategy: Strategy) -> usize {
        self.entries
            .read()
            .await
            .keys()
            .filter(|(s, _)| *s == strategy)
            .count()
    }
}

#[async_trait::async_trait]
impl RecommendationStore for InMemoryStore {
    async fn get(
        &self,
        item_id: ItemId,
        strategy: Strategy,
    ) -> AppResult<Option<RecommendationEntry>> {
        Ok(self.entries.read().await.get(&(strategy, item_id)).cloned())
    }

    async fn put(
        &self,
        item_id: ItemId,
        strategy: Strategy,
        entry: RecommendationEntry,
    ) -> AppResult<()> {
        self.entries.write().await.insert((strategy, item_id), entry);
        Ok(())
    }

    async fn clear(&self, strategy: Strategy) -> AppResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|(s, _), _| *s != strategy);
        Ok((before - entries.len()) as u64)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoredItem;
    use tokio_test::assert_ok;

    fn entry(ids: &[ItemId]) -> RecommendationEntry {
        RecommendationEntry::new(
            ids.iter()
                .map(|&item_id| ScoredItem { item_id, score: 1.0 })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = InMemoryStore::new();
        assert_eq!(store.get(1, Strategy::Genre).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = InMemoryStore::new();
        assert_ok!(store.put(1, Strategy::Genre, entry(&[2, 3])).await);
        assert_ok!(store.put(1, Strategy::Genre, entry(&[4])).await);

        let stored = store.get(1, Strategy::Genre).await.unwrap().unwrap();
        assert_eq!(stored.top(10), vec![4]);
    }

    #[tokio::test]
    async fn test_clear_only_touches_one_strategy() {
        let store = InMemoryStore::new();
        store.put(1, Strategy::Genre, entry(&[2])).await.unwrap();
        store.put(2, Strategy::Genre, entry(&[1])).await.unwrap();
        store.put(1, Strategy::Plot, entry(&[2])).await.unwrap();

        let removed = assert_ok!(store.clear(Strategy::Genre).await);

        assert_eq!(removed, 2);
        assert_eq!(store.count(Strategy::Genre).await, 0);
        assert!(store.get(1, Strategy::Plot).await.unwrap().is_some());
    }
}
