use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reelmatch_api::{
    api::{create_router, AppState},
    config::Config,
    db::{create_pool, create_redis_client, InMemoryStore, PgCatalog, RecommendationStore, RedisStore},
    services::{CorpusSource, EngineContext, JsonCorpus, StrategyRegistry},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("reelmatch_api=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let source: Arc<dyn CorpusSource> = match (&config.database_url, &config.corpus_path) {
        (Some(database_url), _) => {
            let pool = create_pool(database_url)
                .await
                .context("Failed to connect to the catalog database")?;
            Arc::new(PgCatalog::new(pool))
        }
        (None, Some(path)) => Arc::new(JsonCorpus::new(path)),
        (None, None) => anyhow::bail!("Either DATABASE_URL or CORPUS_PATH must be set"),
    };

    let store: Arc<dyn RecommendationStore> = match &config.redis_url {
        Some(redis_url) => {
            let client = create_redis_client(redis_url)?;
            Arc::new(RedisStore::connect(client).await?)
        }
        None => {
            tracing::warn!("REDIS_URL not set, precomputed recommendations are kept in memory");
            Arc::new(InMemoryStore::new())
        }
    };

    let registry = StrategyRegistry::standard();
    let live_strategies = registry.live_strategies();
    let context = Arc::new(EngineContext::new(source, registry, config.engine_settings()));

    if config.warm_live_strategies {
        context.spawn_warm_up(live_strategies);
    }

    let state = AppState::new(context, store, config.default_top_k, config.max_k);
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server running on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
