use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio::task::JoinHandle;

use crate::{
    engine::{self, ForestParams, IndexKind, SimilarityIndex},
    error::{AppError, AppResult, EngineError},
    models::{ItemId, ItemRecord, SimilarityResult, Strategy},
    services::{catalog::CorpusSource, registry::StrategyRegistry},
};

/// Tunables for index construction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineSettings {
    pub forest: ForestParams,
}

/// A fully built index for one strategy
pub struct LiveIndex {
    pub strategy: Strategy,
    pub index: Arc<dyn SimilarityIndex>,
    pub built_at: DateTime<Utc>,
}

impl LiveIndex {
    /// Neighbours of `item_id`.
    ///
    /// Items outside the feature space are `NotFound` for exact indexes and an
    /// empty list for approximate ones.
    pub fn query(&self, item_id: ItemId, k: usize) -> Result<SimilarityResult, EngineError> {
        match self.index.query_item(item_id, k) {
            Some(result) => Ok(result),
            None if self.index.kind() == IndexKind::Exact => Err(EngineError::NotFound {
                item_id,
                strategy: self.strategy,
            }),
            None => Ok(Vec::new()),
        }
    }

    pub fn summary(&self) -> IndexSummary {
        let space = self.index.space();
        IndexSummary {
            strategy: self.strategy,
            kind: self.index.kind(),
            attribute: space.attribute().to_string(),
            items: space.len(),
            dim: space.dim(),
            built_at: self.built_at,
        }
    }
}

/// Description of a built index returned to operators
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexSummary {
    pub strategy: Strategy,
    pub kind: IndexKind,
    pub attribute: String,
    pub items: usize,
    pub dim: usize,
    pub built_at: DateTime<Utc>,
}

#[derive(Default)]
struct StrategySlot {
    active: RwLock<Option<Arc<LiveIndex>>>,
    /// Held for the whole duration of a build
    build_lock: Mutex<()>,
    /// Held for the whole duration of a pipeline run
    run_lock: Mutex<()>,
}

/// Corpus snapshot, strategy table and live indexes for one process.
///
/// Each strategy owns a slot holding its active live index. Builds run on
/// tokio's blocking pool and the finished index replaces the active one with a
/// single `Arc` swap, so readers only ever see complete snapshots. A failed
/// build leaves the previous snapshot in place.
pub struct EngineContext {
    source: Arc<dyn CorpusSource>,
    registry: StrategyRegistry,
    settings: EngineSettings,
    corpus: RwLock<Option<Arc<Vec<ItemRecord>>>>,
    corpus_lock: Mutex<()>,
    slots: HashMap<Strategy, StrategySlot>,
}

impl EngineContext {
    pub fn new(
        source: Arc<dyn CorpusSource>,
        registry: StrategyRegistry,
        settings: EngineSettings,
    ) -> Self {
        let slots = registry
            .bundles()
            .map(|bundle| (bundle.strategy, StrategySlot::default()))
            .collect();

        Self {
            source,
            registry,
            settings,
            corpus: RwLock::new(None),
            corpus_lock: Mutex::new(()),
            slots,
        }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// The corpus snapshot, loaded from the source on first use
    pub async fn corpus(&self) -> AppResult<Arc<Vec<ItemRecord>>> {
        if let Some(corpus) = self.corpus.read().await.as_ref() {
            return Ok(corpus.clone());
        }

        let _guard = self.corpus_lock.lock().await;
        if let Some(corpus) = self.corpus.read().await.as_ref() {
            return Ok(corpus.clone());
        }

        self.load_corpus().await
    }

    /// Loads a fresh corpus and drops every live index built from the old one
    pub async fn reload_corpus(&self) -> AppResult<Arc<Vec<ItemRecord>>> {
        let corpus = {
            let _guard = self.corpus_lock.lock().await;
            self.load_corpus().await?
        };

        for strategy in self.slots.keys() {
            self.invalidate(*strategy).await;
        }

        Ok(corpus)
    }

    async fn load_corpus(&self) -> AppResult<Arc<Vec<ItemRecord>>> {
        let records = Arc::new(self.source.load_items().await?);
        tracing::info!(source = self.source.name(), items = records.len(), "Corpus loaded");
        *self.corpus.write().await = Some(records.clone());
        Ok(records)
    }

    fn slot(&self, strategy: Strategy) -> AppResult<&StrategySlot> {
        self.slots
            .get(&strategy)
            .ok_or_else(|| AppError::NotFound(format!("Strategy {} is not registered", strategy)))
    }

    /// The active live index, if one has been built
    pub async fn active(&self, strategy: Strategy) -> Option<Arc<LiveIndex>> {
        let slot = self.slots.get(&strategy)?;
        slot.active.read().await.clone()
    }

    /// Returns the active index, building it first if there is none.
    ///
    /// Only one build per strategy runs at a time; concurrent callers wait for it
    /// and share the result.
    pub async fn ensure_built(&self, strategy: Strategy) -> AppResult<Arc<LiveIndex>> {
        let slot = self.slot(strategy)?;
        if let Some(live) = slot.active.read().await.clone() {
            return Ok(live);
        }

        let _guard = slot.build_lock.lock().await;
        if let Some(live) = slot.active.read().await.clone() {
            return Ok(live);
        }

        self.build_and_swap(strategy, slot, None).await
    }

    /// Builds a fresh index and swaps it in, replacing any active one
    pub async fn rebuild(
        &self,
        strategy: Strategy,
        tree_count: Option<usize>,
    ) -> AppResult<Arc<LiveIndex>> {
        let slot = self.slot(strategy)?;
        let _guard = slot.build_lock.lock().await;
        self.build_and_swap(strategy, slot, tree_count).await
    }

    /// Drops the active index; the next `ensure_built` rebuilds it.
    ///
    /// Waits for a build in flight, so its result cannot be swapped in afterwards.
    pub async fn invalidate(&self, strategy: Strategy) {
        if let Some(slot) = self.slots.get(&strategy) {
            let _guard = slot.build_lock.lock().await;
            if slot.active.write().await.take().is_some() {
                tracing::info!(%strategy, "Live index invalidated");
            }
        }
    }

    /// Serializes pipeline runs for one strategy
    pub(crate) async fn lock_runs(&self, strategy: Strategy) -> AppResult<MutexGuard<'_, ()>> {
        let slot = self.slot(strategy)?;
        Ok(slot.run_lock.lock().await)
    }

    /// Builds the given strategies in the background.
    ///
    /// Safe to call repeatedly: strategies that are already built or building
    /// are not built twice.
    pub fn spawn_warm_up(self: &Arc<Self>, strategies: Vec<Strategy>) -> JoinHandle<()> {
        let context = Arc::clone(self);
        tokio::spawn(async move {
            for strategy in strategies {
                match context.ensure_built(strategy).await {
                    Ok(live) => tracing::info!(%strategy, items = live.index.len(), "Live index warmed"),
                    Err(e) => tracing::error!(%strategy, error = %e, "Live index warm-up failed"),
                }
            }
        })
    }

    async fn build_and_swap(
        &self,
        strategy: Strategy,
        slot: &StrategySlot,
        tree_count: Option<usize>,
    ) -> AppResult<Arc<LiveIndex>> {
        let bundle = self
            .registry
            .get(strategy)
            .ok_or_else(|| AppError::NotFound(format!("Strategy {} is not registered", strategy)))?;
        let attribute = bundle.attribute.clone().ok_or_else(|| {
            AppError::InvalidInput(format!("Strategy {} has no feature space", strategy))
        })?;
        let kind = bundle.index;

        let mut params = self.settings.forest.clone();
        if let Some(tree_count) = tree_count {
            params.tree_count = tree_count;
        }

        let corpus = self.corpus().await?;
        tracing::info!(%strategy, %attribute, ?kind, items = corpus.len(), "Building live index");

        let index = tokio::task::spawn_blocking(move || {
            engine::build_index(&corpus, &attribute, kind, params)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Index build task failed: {}", e)))??;

        let live = Arc::new(LiveIndex {
            strategy,
            index,
            built_at: Utc::now(),
        });
        *slot.active.write().await = Some(live.clone());

        tracing::info!(%strategy, items = live.index.len(), "Live index swapped in");
        Ok(live)
    }
}
