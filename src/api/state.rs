use std::sync::Arc;

use crate::db::RecommendationStore;
use crate::services::{EngineContext, PrecomputationPipeline, StrategyDispatcher};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub context: Arc<EngineContext>,
    pub dispatcher: Arc<StrategyDispatcher>,
    pub pipeline: Arc<PrecomputationPipeline>,
    /// `k` used when a request does not name one
    pub default_k: usize,
    pub max_k: usize,
}

impl AppState {
    /// Wires the dispatcher and pipeline to one engine context and store
    pub fn new(
        context: Arc<EngineContext>,
        store: Arc<dyn RecommendationStore>,
        default_k: usize,
        max_k: usize,
    ) -> Self {
        Self {
            dispatcher: Arc::new(StrategyDispatcher::new(context.clone(), store.clone())),
            pipeline: Arc::new(PrecomputationPipeline::new(context.clone(), store)),
            context,
            default_k,
            max_k,
        }
    }
}
