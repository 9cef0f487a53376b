use std::path::PathBuf;

use crate::{
    error::{AppError, AppResult},
    models::ItemRecord,
};

/// Supplies the complete set of item records.
///
/// Asked once per process, or again on an explicit reload.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CorpusSource: Send + Sync {
    async fn load_items(&self) -> AppResult<Vec<ItemRecord>>;

    /// Source name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Fixed set of records held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCorpus {
    records: Vec<ItemRecord>,
}

impl InMemoryCorpus {
    pub fn new(records: Vec<ItemRecord>) -> Self {
        Self { records }
    }
}

#[async_trait::async_trait]
impl CorpusSource for InMemoryCorpus {
    async fn load_items(&self) -> AppResult<Vec<ItemRecord>> {
        Ok(self.records.clone())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// JSON array of [`ItemRecord`] exported by the ingestion jobs
#[derive(Debug, Clone)]
pub struct JsonCorpus {
    path: PathBuf,
}

impl JsonCorpus {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl CorpusSource for JsonCorpus {
    async fn load_items(&self) -> AppResult<Vec<ItemRecord>> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AppError::Internal(format!("Failed to read {}: {}", self.path.display(), e))
        })?;

        let records: Vec<ItemRecord> = serde_json::from_str(&raw).map_err(|e| {
            AppError::InvalidInput(format!("Malformed corpus {}: {}", self.path.display(), e))
        })?;

        tracing::info!(path = %self.path.display(), items = records.len(), "Loaded corpus file");
        Ok(records)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GENRES;

    #[tokio::test]
    async fn test_json_corpus_reads_records() {
        let path = std::env::temp_dir().join(format!("reelmatch-corpus-{}.json", uuid::Uuid::new_v4()));
        tokio::fs::write(
            &path,
            r#"[{"id": 1, "title": "Toy Story", "categories": {"genres": ["Animation"]}},
                {"id": 2, "embeddings": {"visual": [0.5, 0.5]}}]"#,
        )
        .await
        .unwrap();

        let records = JsonCorpus::new(&path).load_items().await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(records.len(), 2);
        assert!(records[0].categories[GENRES].contains("Animation"));
        assert_eq!(records[1].embeddings["visual"], vec![0.5, 0.5]);
    }

    #[tokio::test]
    async fn test_json_corpus_missing_file() {
        let result = JsonCorpus::new("/nonexistent/reelmatch/corpus.json")
            .load_items()
            .await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn test_in_memory_corpus() {
        let corpus = InMemoryCorpus::new(vec![ItemRecord::new(3)]);
        let records = corpus.load_items().await.unwrap();
        assert_eq!(records, vec![ItemRecord::new(3)]);
    }
}
