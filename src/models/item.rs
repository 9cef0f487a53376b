use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Stable catalog identifier of an item
pub type ItemId = i64;

/// Categorical attribute holding genre labels
pub const GENRES: &str = "genres";
/// Categorical attribute holding directors and top-billed actors
pub const COLLABORATORS: &str = "collaborators";
/// Dense poster embedding
pub const VISUAL: &str = "visual";
/// Dense topic-model distribution over the plot summary
pub const TOPIC: &str = "topic";

/// Number of billed actors that count as collaborators
pub const MAX_BILLED_ACTORS: usize = 5;

/// An item as supplied by the catalog, with every attribute the engine can vectorize
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: ItemId,
    #[serde(default)]
    pub title: Option<String>,
    /// Named set-valued attributes (genres, collaborators)
    #[serde(default)]
    pub categories: BTreeMap<String, BTreeSet<String>>,
    /// Tag id -> relevance in [0, 1]
    #[serde(default)]
    pub relevance: BTreeMap<u32, f32>,
    /// Named precomputed embeddings (visual, topic)
    #[serde(default)]
    pub embeddings: BTreeMap<String, Vec<f32>>,
}

impl ItemRecord {
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_category<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories
            .entry(name.to_string())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn with_relevance(mut self, tag_id: u32, relevance: f32) -> Self {
        self.relevance.insert(tag_id, relevance);
        self
    }

    pub fn with_embedding(mut self, name: &str, vector: Vec<f32>) -> Self {
        self.embeddings.insert(name.to_string(), vector);
        self
    }
}

/// Builds a collaborator set from every director plus the first billed actors
pub fn collaborators<'a>(
    directors: impl IntoIterator<Item = &'a str>,
    actors_in_billing_order: impl IntoIterator<Item = &'a str>,
) -> BTreeSet<String> {
    directors
        .into_iter()
        .chain(actors_in_billing_order.into_iter().take(MAX_BILLED_ACTORS))
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}
