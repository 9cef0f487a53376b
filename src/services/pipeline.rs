use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::RecommendationStore,
    error::{AppError, AppResult},
    models::{ItemId, RecommendationEntry, SimilarityResult, Strategy},
    services::context::{EngineContext, IndexSummary, LiveIndex},
};

const PROGRESS_INTERVAL: usize = 100;

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PipelineOptions {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Remove every stored entry of the strategy before writing
    #[serde(default)]
    pub clear_existing: bool,
    /// Overrides the configured forest size for approximate strategies
    #[serde(default)]
    pub tree_count: Option<usize>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            clear_existing: false,
            tree_count: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub strategy: Strategy,
    /// Members of the strategy's feature space
    pub items: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Entries removed before the run, when clearing was requested
    pub cleared: Option<u64>,
}

/// Batch job that fills the recommendation store for one strategy
pub struct PrecomputationPipeline {
    context: Arc<EngineContext>,
    store: Arc<dyn RecommendationStore>,
}

impl PrecomputationPipeline {
    pub fn new(context: Arc<EngineContext>, store: Arc<dyn RecommendationStore>) -> Self {
        Self { context, store }
    }

    /// Rebuilds the strategy's index and writes top-k lists for its members.
    ///
    /// Runs for the same strategy are serialized. Failing to build the index or
    /// to clear the store aborts the run; per-item store failures are counted.
    pub async fn run(&self, strategy: Strategy, options: PipelineOptions) -> AppResult<PipelineReport> {
        if options.top_k == 0 {
            return Err(AppError::InvalidInput("top_k must be at least 1".to_string()));
        }
        if strategy == Strategy::Random {
            return Err(AppError::InvalidInput(
                "The random baseline cannot be precomputed".to_string(),
            ));
        }

        let _run = self.context.lock_runs(strategy).await?;
        let run_id = Uuid::new_v4();
        tracing::info!(%run_id, %strategy, top_k = options.top_k, clear_existing = options.clear_existing, "Precomputation started");

        let live = self
            .context
            .rebuild(strategy, options.tree_count)
            .await
            .map_err(|e| {
                tracing::error!(%run_id, %strategy, error = %e, "Index build failed, aborting run");
                e
            })?;

        let cleared = if options.clear_existing {
            let removed = self.store.clear(strategy).await.map_err(|e| {
                tracing::error!(%run_id, %strategy, error = %e, "Failed to clear store, aborting run");
                e
            })?;
            tracing::info!(%run_id, %strategy, removed, "Cleared stored entries");
            Some(removed)
        } else {
            None
        };

        let mut report = PipelineReport {
            run_id,
            strategy,
            items: live.index.len(),
            updated: 0,
            skipped: 0,
            failed: 0,
            cleared,
        };

        let pending = self
            .pending_items(&live, options.top_k, cleared.is_some(), &mut report)
            .await;

        let results = compute(live, pending, options.top_k).await?;

        for (done, (item_id, result)) in results.into_iter().enumerate() {
            let complete = result.len() + 1 >= report.items;
            let entry = RecommendationEntry::new(result).with_complete(complete);
            match self.store.put(item_id, strategy, entry).await
            {
                Ok(()) => report.updated += 1,
                Err(e) => {
                    tracing::error!(%run_id, item_id, %strategy, error = %e, "Failed to store recommendations");
                    report.failed += 1;
                }
            }

            if (done + 1) % PROGRESS_INTERVAL == 0 {
                tracing::info!(%run_id, %strategy, processed = done + 1, "Precomputation progress");
            }
        }

        tracing::info!(
            %run_id,
            %strategy,
            items = report.items,
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failed,
            "Precomputation finished"
        );
        Ok(report)
    }

    /// Rebuilds and swaps in the strategy's index without touching the store
    pub async fn rebuild_index(
        &self,
        strategy: Strategy,
        tree_count: Option<usize>,
    ) -> AppResult<IndexSummary> {
        let live = self.context.rebuild(strategy, tree_count).await?;
        Ok(live.summary())
    }

    /// Members whose stored entry is missing, or short without being complete
    async fn pending_items(
        &self,
        live: &LiveIndex,
        top_k: usize,
        cleared: bool,
        report: &mut PipelineReport,
    ) -> Vec<ItemId> {
        let members = live.index.space().item_ids();
        if cleared {
            return members.to_vec();
        }

        let mut pending = Vec::with_capacity(members.len());
        for &item_id in members {
            match self.store.get(item_id, report.strategy).await {
                Ok(Some(entry)) if entry.satisfies(top_k) => {
                    tracing::debug!(item_id, strategy = %report.strategy, "Entry up to date");
                    report.skipped += 1;
                }
                Ok(_) => pending.push(item_id),
                Err(e) => {
                    tracing::error!(run_id = %report.run_id, item_id, strategy = %report.strategy, error = %e, "Failed to read stored entry");
                    report.failed += 1;
                }
            }
        }
        pending
    }
}

/// Queries the index for every pending item, fanned out over rayon's pool
async fn compute(
    live: Arc<LiveIndex>,
    pending: Vec<ItemId>,
    top_k: usize,
) -> AppResult<Vec<(ItemId, SimilarityResult)>> {
    tokio::task::spawn_blocking(move || {
        pending
            .into_par_iter()
            .filter_map(|item_id| {
                live.index
                    .query_item(item_id, top_k)
                    .map(|result| (item_id, result))
            })
            .collect()
    })
    .await
    .map_err(|e| AppError::Internal(format!("Precomputation task failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{store::MockRecommendationStore, InMemoryStore};
    use crate::error::EngineError;
    use crate::models::{ItemRecord, GENRES, VISUAL};
    use crate::services::catalog::InMemoryCorpus;
    use crate::services::context::EngineSettings;
    use crate::services::registry::StrategyRegistry;

    fn corpus() -> Vec<ItemRecord> {
        vec![
            ItemRecord::new(1).with_category(GENRES, ["A", "B"]),
            ItemRecord::new(2).with_category(GENRES, ["A"]),
            ItemRecord::new(3).with_category(GENRES, ["B"]),
            ItemRecord::new(4).with_category(GENRES, ["A", "B"]),
            ItemRecord::new(5).with_embedding(VISUAL, vec![1.0, 0.0]),
            ItemRecord::new(6).with_embedding(VISUAL, vec![0.9, 0.1]),
        ]
    }

    fn context() -> Arc<EngineContext> {
        Arc::new(EngineContext::new(
            Arc::new(InMemoryCorpus::new(corpus())),
            StrategyRegistry::standard(),
            EngineSettings::default(),
        ))
    }

    fn options(top_k: usize, clear_existing: bool) -> PipelineOptions {
        PipelineOptions {
            top_k,
            clear_existing,
            tree_count: None,
        }
    }

    #[tokio::test]
    async fn test_run_fills_store_for_members() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = PrecomputationPipeline::new(context(), store.clone());

        let report = pipeline.run(Strategy::Genre, options(2, false)).await.unwrap();

        assert_eq!(report.items, 4);
        assert_eq!(report.updated, 4);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(report.cleared, None);
        assert_eq!(store.count(Strategy::Genre).await, 4);

        let entry = store.get(1, Strategy::Genre).await.unwrap().unwrap();
        assert_eq!(entry.top(2), vec![4, 2]);
        assert!(store.get(5, Strategy::Genre).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = PrecomputationPipeline::new(context(), store.clone());

        pipeline.run(Strategy::Genre, options(2, false)).await.unwrap();
        let before = store.get(1, Strategy::Genre).await.unwrap().unwrap();

        let report = pipeline.run(Strategy::Genre, options(2, false)).await.unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(report.skipped, 4);
        assert_eq!(store.get(1, Strategy::Genre).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn test_top_k_beyond_space_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = PrecomputationPipeline::new(context(), store.clone());

        // Four genre members, so each entry holds at most three neighbours
        pipeline.run(Strategy::Genre, options(5, false)).await.unwrap();
        let before = store.get(1, Strategy::Genre).await.unwrap().unwrap();
        assert_eq!(before.len(), 3);
        assert!(before.complete);

        let report = pipeline.run(Strategy::Genre, options(5, false)).await.unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(report.skipped, 4);
        assert_eq!(store.get(1, Strategy::Genre).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn test_larger_top_k_recomputes_short_entries() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = PrecomputationPipeline::new(context(), store.clone());

        pipeline.run(Strategy::Genre, options(1, false)).await.unwrap();
        let report = pipeline.run(Strategy::Genre, options(3, false)).await.unwrap();

        assert_eq!(report.updated, 4);
        let entry = store.get(1, Strategy::Genre).await.unwrap().unwrap();
        assert_eq!(entry.top(3), vec![4, 2, 3]);
    }

    #[tokio::test]
    async fn test_clear_existing_rewrites_everything() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put(99, Strategy::Genre, RecommendationEntry::new(vec![]))
            .await
            .unwrap();
        let pipeline = PrecomputationPipeline::new(context(), store.clone());

        pipeline.run(Strategy::Genre, options(2, false)).await.unwrap();
        let report = pipeline.run(Strategy::Genre, options(2, true)).await.unwrap();

        assert_eq!(report.cleared, Some(5));
        assert_eq!(report.updated, 4);
        assert_eq!(report.skipped, 0);
        assert_eq!(store.count(Strategy::Genre).await, 4);
    }

    #[tokio::test]
    async fn test_run_swaps_live_index() {
        let context = context();
        let pipeline = PrecomputationPipeline::new(context.clone(), Arc::new(InMemoryStore::new()));
        assert!(context.active(Strategy::Visual).await.is_none());

        pipeline.run(Strategy::Visual, options(1, false)).await.unwrap();
        assert!(context.active(Strategy::Visual).await.is_some());
    }

    #[tokio::test]
    async fn test_put_failures_are_counted() {
        let mut store = MockRecommendationStore::new();
        store.expect_get().returning(|_, _| Ok(None));
        store.expect_put().returning(|item_id, _, _| {
            if item_id == 2 {
                Err(AppError::Internal("write refused".to_string()))
            } else {
                Ok(())
            }
        });
        store.expect_name().return_const("mock");
        let pipeline = PrecomputationPipeline::new(context(), Arc::new(store));

        let report = pipeline.run(Strategy::Genre, options(2, false)).await.unwrap();
        assert_eq!(report.updated, 3);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_clear_failure_aborts_run() {
        let mut store = MockRecommendationStore::new();
        store
            .expect_clear()
            .returning(|_| Err(AppError::Internal("connection reset".to_string())));
        store.expect_put().never();
        let pipeline = PrecomputationPipeline::new(context(), Arc::new(store));

        let result = pipeline.run(Strategy::Genre, options(2, true)).await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn test_build_failure_aborts_before_clearing() {
        let mut store = MockRecommendationStore::new();
        store.expect_clear().never();
        store.expect_put().never();
        let pipeline = PrecomputationPipeline::new(context(), Arc::new(store));

        // No item carries topic embeddings
        let result = pipeline.run(Strategy::Plot, options(2, true)).await;
        assert!(matches!(
            result,
            Err(AppError::Engine(EngineError::EmptyCorpus { .. }))
        ));
    }

    #[tokio::test]
    async fn test_rejects_random_and_zero_top_k() {
        let pipeline = PrecomputationPipeline::new(context(), Arc::new(InMemoryStore::new()));

        assert!(matches!(
            pipeline.run(Strategy::Random, options(5, false)).await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            pipeline.run(Strategy::Genre, options(0, false)).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_rebuild_index_leaves_store_alone() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = PrecomputationPipeline::new(context(), store.clone());

        let summary = pipeline.rebuild_index(Strategy::Visual, Some(3)).await.unwrap();
        assert_eq!(summary.items, 2);
        assert_eq!(summary.dim, 2);
        assert_eq!(summary.attribute, "visual");
        assert_eq!(store.count(Strategy::Visual).await, 0);
    }

    #[test]
    fn test_options_defaults() {
        let options: PipelineOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, PipelineOptions::default());
        assert_eq!(options.top_k, 5);
    }
}
