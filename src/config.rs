use serde::Deserialize;

use crate::engine::ForestParams;
use crate::services::EngineSettings;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// PostgreSQL catalog URL; takes precedence over `corpus_path`
    pub database_url: Option<String>,

    /// JSON corpus file used when no database is configured
    pub corpus_path: Option<String>,

    /// Redis URL for the recommendation store; in-memory when unset
    pub redis_url: Option<String>,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// `k` used when a request does not name one
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Largest `k` a request may ask for
    #[serde(default = "default_max_k")]
    pub max_k: usize,

    #[serde(default = "default_ann_tree_count")]
    pub ann_tree_count: usize,

    #[serde(default = "default_ann_leaf_size")]
    pub ann_leaf_size: usize,

    /// Nodes inspected per approximate query; `tree_count * n` when unset
    pub ann_search_k: Option<usize>,

    #[serde(default = "default_ann_seed")]
    pub ann_seed: u64,

    /// Build live strategies in the background at startup
    #[serde(default = "default_warm_live_strategies")]
    pub warm_live_strategies: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_top_k() -> usize {
    5
}

fn default_max_k() -> usize {
    100
}

fn default_ann_tree_count() -> usize {
    50
}

fn default_ann_leaf_size() -> usize {
    32
}

fn default_ann_seed() -> u64 {
    42
}

fn default_warm_live_strategies() -> bool {
    true
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            forest: ForestParams {
                tree_count: self.ann_tree_count,
                leaf_size: self.ann_leaf_size,
                search_k: self.ann_search_k,
                seed: self.ann_seed,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        envy::from_iter(
            pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string())),
        )
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = from_pairs(&[]);

        assert_eq!(config.database_url, None);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert_eq!(config.default_top_k, 5);
        assert_eq!(config.max_k, 100);
        assert!(config.warm_live_strategies);
        assert_eq!(config.engine_settings(), EngineSettings::default());
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("CORPUS_PATH", "/data/movies.json"),
            ("PORT", "8080"),
            ("ANN_TREE_COUNT", "10"),
            ("ANN_SEARCH_K", "500"),
            ("WARM_LIVE_STRATEGIES", "false"),
        ]);

        assert_eq!(config.corpus_path.as_deref(), Some("/data/movies.json"));
        assert_eq!(config.port, 8080);
        assert!(!config.warm_live_strategies);

        let forest = config.engine_settings().forest;
        assert_eq!(forest.tree_count, 10);
        assert_eq!(forest.search_k, Some(500));
        assert_eq!(forest.leaf_size, 32);
    }
}
