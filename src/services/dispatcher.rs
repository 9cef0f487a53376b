use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::{
    db::RecommendationStore,
    error::{EngineError, StaleCacheWarning},
    models::{ItemId, RecommendationEntry, Strategy},
    services::{
        context::{EngineContext, LiveIndex},
        registry::{Fallback, Serving, StrategyBundle},
    },
};

/// Which tier produced a recommendation list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    Store,
    LiveIndex,
    /// A stored entry shorter than requested, served as is
    StaleStore,
    RandomBaseline,
    Empty,
}

/// A served recommendation list and how it was obtained
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub strategy: Strategy,
    pub items: Vec<ItemId>,
    pub source: RecommendationSource,
    pub warning: Option<StaleCacheWarning>,
}

impl DispatchOutcome {
    fn new(strategy: Strategy, items: Vec<ItemId>, source: RecommendationSource) -> Self {
        Self {
            strategy,
            items,
            source,
            warning: None,
        }
    }
}

/// Single entry point for recommendation queries
///
/// Tries the precomputed store, then a live index, then the strategy's
/// fallback. It never fails and never writes to the store.
pub struct StrategyDispatcher {
    context: Arc<EngineContext>,
    store: Arc<dyn RecommendationStore>,
}

impl StrategyDispatcher {
    pub fn new(context: Arc<EngineContext>, store: Arc<dyn RecommendationStore>) -> Self {
        Self { context, store }
    }

    /// Up to `k` item ids similar to `item_id`, never including `item_id` itself
    pub async fn recommend(&self, item_id: ItemId, k: usize, strategy: Strategy) -> Vec<ItemId> {
        self.recommend_detailed(item_id, k, strategy).await.items
    }

    pub async fn recommend_detailed(
        &self,
        item_id: ItemId,
        k: usize,
        strategy: Strategy,
    ) -> DispatchOutcome {
        if k == 0 {
            return DispatchOutcome::new(strategy, Vec::new(), RecommendationSource::Empty);
        }

        let Some(bundle) = self.context.registry().get(strategy) else {
            tracing::warn!(%strategy, "Strategy not registered, using random baseline");
            return self.random_baseline(strategy, item_id, k).await;
        };

        if bundle.attribute.is_none() {
            return self.random_baseline(strategy, item_id, k).await;
        }

        let stored = match self.store.get(item_id, strategy).await {
            Ok(entry) => entry.map(|entry| (stored_ids(&entry, item_id), entry.complete)),
            Err(e) => {
                tracing::warn!(item_id, %strategy, store = self.store.name(), error = %e, "Store lookup failed");
                None
            }
        };

        if let Some((ids, complete)) = &stored {
            if ids.len() >= k || *complete {
                let items = ids.iter().take(k).copied().collect();
                return DispatchOutcome::new(strategy, items, RecommendationSource::Store);
            }
        }

        if let Some(live) = self.live_index(bundle).await {
            match live.query(item_id, k) {
                Ok(result) => {
                    let items = result.into_iter().map(|scored| scored.item_id).collect();
                    return DispatchOutcome::new(strategy, items, RecommendationSource::LiveIndex);
                }
                Err(EngineError::NotFound { .. }) => {
                    tracing::debug!(item_id, %strategy, "Item not in live index");
                }
                Err(e) => {
                    tracing::warn!(item_id, %strategy, error = %e, "Live query failed");
                }
            }
        }

        if let Some((ids, _)) = stored.filter(|(ids, _)| !ids.is_empty()) {
            let warning = StaleCacheWarning {
                item_id,
                strategy,
                stored: ids.len(),
                requested: k,
            };
            tracing::warn!(%warning, "Serving insufficient cache entry");
            return DispatchOutcome {
                strategy,
                items: ids,
                source: RecommendationSource::StaleStore,
                warning: Some(warning),
            };
        }

        match bundle.fallback {
            Fallback::RandomBaseline => self.random_baseline(strategy, item_id, k).await,
            Fallback::Empty => DispatchOutcome::new(strategy, Vec::new(), RecommendationSource::Empty),
        }
    }

    /// Live strategies are built on first access; precomputed ones only use an
    /// index that is already active
    async fn live_index(&self, bundle: &StrategyBundle) -> Option<Arc<LiveIndex>> {
        match bundle.serving {
            Serving::Live => match self.context.ensure_built(bundle.strategy).await {
                Ok(live) => Some(live),
                Err(e) => {
                    tracing::warn!(strategy = %bundle.strategy, error = %e, "Live index unavailable");
                    None
                }
            },
            Serving::Precomputed => self.context.active(bundle.strategy).await,
        }
    }

    async fn random_baseline(&self, strategy: Strategy, item_id: ItemId, k: usize) -> DispatchOutcome {
        let corpus = match self.context.corpus().await {
            Ok(corpus) => corpus,
            Err(e) => {
                tracing::warn!(error = %e, "Corpus unavailable for random baseline");
                return DispatchOutcome::new(strategy, Vec::new(), RecommendationSource::Empty);
            }
        };

        let candidates: Vec<ItemId> = corpus
            .iter()
            .map(|record| record.id)
            .filter(|id| *id != item_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let items = candidates
            .choose_multiple(&mut rand::thread_rng(), k)
            .copied()
            .collect();

        DispatchOutcome::new(strategy, items, RecommendationSource::RandomBaseline)
    }
}

/// Stored ids with the query item filtered out
fn stored_ids(entry: &RecommendationEntry, item_id: ItemId) -> Vec<ItemId> {
    entry
        .items
        .iter()
        .map(|scored| scored.item_id)
        .filter(|id| *id != item_id)
        .collect()
}
