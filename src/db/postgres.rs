use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use std::collections::BTreeMap;

use crate::{
    error::AppResult,
    models::{item::collaborators, ItemId, ItemRecord, COLLABORATORS, GENRES},
    services::catalog::CorpusSource,
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

#[derive(Debug, Clone, FromRow)]
pub struct ItemRow {
    pub id: ItemId,
    pub title: Option<String>,
}

/// One categorical value; `position` is the billing order for people
#[derive(Debug, Clone, FromRow)]
pub struct AttributeRow {
    pub item_id: ItemId,
    pub attribute: String,
    pub value: String,
    pub position: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct RelevanceRow {
    pub item_id: ItemId,
    pub tag_id: i32,
    pub relevance: f32,
}

#[derive(Debug, Clone, FromRow)]
pub struct EmbeddingRow {
    pub item_id: ItemId,
    pub kind: String,
    pub vector: Vec<f32>,
}

/// Reads the item catalog maintained by the ingestion jobs
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CorpusSource for PgCatalog {
    async fn load_items(&self) -> AppResult<Vec<ItemRecord>> {
        let items: Vec<ItemRow> = sqlx::query_as("SELECT id, title FROM items ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let attributes: Vec<AttributeRow> = sqlx::query_as(
            "SELECT item_id, attribute, value, position FROM item_attributes \
             ORDER BY item_id, attribute, position",
        )
        .fetch_all(&self.pool)
        .await?;

        let relevance: Vec<RelevanceRow> =
            sqlx::query_as("SELECT item_id, tag_id, relevance FROM item_tag_relevance")
                .fetch_all(&self.pool)
                .await?;

        let embeddings: Vec<EmbeddingRow> =
            sqlx::query_as("SELECT item_id, kind, vector FROM item_embeddings")
                .fetch_all(&self.pool)
                .await?;

        tracing::info!(
            items = items.len(),
            attributes = attributes.len(),
            relevance = relevance.len(),
            embeddings = embeddings.len(),
            "Loaded catalog rows"
        );

        Ok(assemble_records(items, attributes, relevance, embeddings))
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

/// Folds catalog rows into one record per item.
///
/// `genre` rows become the genres set; `director` and `actor` rows become the
/// collaborators set. Any other attribute is kept as a categorical set under its
/// own name. Rows that reference unknown items are ignored.
pub fn assemble_records(
    items: Vec<ItemRow>,
    attributes: Vec<AttributeRow>,
    relevance: Vec<RelevanceRow>,
    embeddings: Vec<EmbeddingRow>,
) -> Vec<ItemRecord> {
    let mut records: BTreeMap<ItemId, ItemRecord> = items
        .into_iter()
        .map(|row| {
            let mut record = ItemRecord::new(row.id);
            record.title = row.title;
            (row.id, record)
        })
        .collect();

    let mut people: BTreeMap<ItemId, (Vec<(i32, String)>, Vec<(i32, String)>)> = BTreeMap::new();

    for row in attributes {
        let Some(record) = records.get_mut(&row.item_id) else {
            continue;
        };
        match row.attribute.as_str() {
            "genre" => {
                record
                    .categories
                    .entry(GENRES.to_string())
                    .or_default()
                    .insert(row.value);
            }
            "director" => people.entry(row.item_id).or_default().0.push((row.position, row.value)),
            "actor" => people.entry(row.item_id).or_default().1.push((row.position, row.value)),
            other => {
                record
                    .categories
                    .entry(other.to_string())
                    .or_default()
                    .insert(row.value);
            }
        }
    }

    for (item_id, (mut directors, mut actors)) in people {
        directors.sort();
        actors.sort();
        let set = collaborators(
            directors.iter().map(|(_, name)| name.as_str()),
            actors.iter().map(|(_, name)| name.as_str()),
        );
        if let Some(record) = records.get_mut(&item_id) {
            record.categories.insert(COLLABORATORS.to_string(), set);
        }
    }

    for row in relevance {
        if let Some(record) = records.get_mut(&row.item_id) {
            match u32::try_from(row.tag_id) {
                Ok(tag_id) => {
                    record.relevance.insert(tag_id, row.relevance);
                }
                Err(_) => tracing::warn!(item_id = row.item_id, tag_id = row.tag_id, "Skipping negative tag id"),
            }
        }
    }

    for row in embeddings {
        if let Some(record) = records.get_mut(&row.item_id) {
            record.embeddings.insert(row.kind, row.vector);
        }
    }

    records.into_values().collect()
}
