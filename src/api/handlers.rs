use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult, StaleCacheWarning},
    models::{ItemId, Strategy},
    services::{
        IndexSummary, PipelineOptions, PipelineReport, RecommendationSource, StrategyBundle,
    },
};

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    pub strategy: Option<String>,
    pub k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub item_id: ItemId,
    pub strategy: Strategy,
    pub k: usize,
    pub items: Vec<ItemId>,
    pub source: RecommendationSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<StaleCacheWarning>,
}

#[derive(Debug, Serialize)]
pub struct StrategyStatus {
    #[serde(flatten)]
    pub bundle: StrategyBundle,
    /// The active live index, if one has been built
    pub live_index: Option<IndexSummary>,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub items: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct RebuildRequest {
    #[serde(default)]
    pub tree_count: Option<usize>,
}

fn parse_strategy(raw: &str) -> AppResult<Strategy> {
    raw.parse().map_err(AppError::InvalidInput)
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Top-k similar items for one item under one strategy
///
/// Never fails for a valid request: unknown items and backend outages degrade
/// to the strategy's fallback.
pub async fn recommendations(
    State(state): State<AppState>,
    Path(item_id): Path<ItemId>,
    Query(query): Query<RecommendationQuery>,
) -> AppResult<Json<RecommendationResponse>> {
    let strategy = match query.strategy.as_deref() {
        Some(raw) => parse_strategy(raw)?,
        None => Strategy::Genre,
    };
    let k = query.k.unwrap_or(state.default_k);
    if k > state.max_k {
        return Err(AppError::InvalidInput(format!(
            "k must be at most {}",
            state.max_k
        )));
    }

    let outcome = state.dispatcher.recommend_detailed(item_id, k, strategy).await;
    tracing::debug!(item_id, %strategy, k, source = ?outcome.source, returned = outcome.items.len(), "Served recommendations");

    Ok(Json(RecommendationResponse {
        item_id,
        strategy,
        k,
        items: outcome.items,
        source: outcome.source,
        warning: outcome.warning,
    }))
}

/// Registered strategies and the state of their live indexes
pub async fn list_strategies(State(state): State<AppState>) -> Json<Vec<StrategyStatus>> {
    let mut statuses = Vec::new();
    for bundle in state.context.registry().bundles() {
        let live_index = state
            .context
            .active(bundle.strategy)
            .await
            .map(|live| live.summary());
        statuses.push(StrategyStatus {
            bundle: bundle.clone(),
            live_index,
        });
    }
    Json(statuses)
}

/// Runs the precomputation pipeline for one strategy
pub async fn precompute(
    State(state): State<AppState>,
    Path(strategy): Path<String>,
    Json(options): Json<PipelineOptions>,
) -> AppResult<Json<PipelineReport>> {
    let strategy = parse_strategy(&strategy)?;
    let report = state.pipeline.run(strategy, options).await?;
    Ok(Json(report))
}

/// Rebuilds a strategy's live index without touching the store
pub async fn rebuild(
    State(state): State<AppState>,
    Path(strategy): Path<String>,
    Json(request): Json<RebuildRequest>,
) -> AppResult<Json<IndexSummary>> {
    let strategy = parse_strategy(&strategy)?;
    let summary = state
        .pipeline
        .rebuild_index(strategy, request.tree_count)
        .await?;
    Ok(Json(summary))
}

/// Reloads the corpus from its source and drops every live index
pub async fn reload_corpus(State(state): State<AppState>) -> AppResult<Json<ReloadResponse>> {
    let corpus = state.context.reload_corpus().await?;
    Ok(Json(ReloadResponse {
        items: corpus.len(),
    }))
}
