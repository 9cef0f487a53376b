use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ItemId;

/// One neighbour of a query item with its cosine similarity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item_id: ItemId,
    pub score: f32,
}

/// Ranked neighbours of a query item, best first, query item excluded
pub type SimilarityResult = Vec<ScoredItem>;

/// Precomputed top-K list for one (item, strategy) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationEntry {
    pub items: Vec<ScoredItem>,
    pub computed_at: DateTime<Utc>,
    /// Holds every other member of the feature space, so no larger k can add more
    #[serde(default)]
    pub complete: bool,
}

impl RecommendationEntry {
    pub fn new(items: Vec<ScoredItem>) -> Self {
        Self {
            items,
            computed_at: Utc::now(),
            complete: false,
        }
    }

    pub fn with_complete(mut self, complete: bool) -> Self {
        self.complete = complete;
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the entry can answer a request for `k` items on its own
    pub fn satisfies(&self, k: usize) -> bool {
        self.complete || self.items.len() >= k
    }

    /// The first `k` item ids
    pub fn top(&self, k: usize) -> Vec<ItemId> {
        self.items.iter().take(k).map(|item| item.item_id).collect()
    }
}
