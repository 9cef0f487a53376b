use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;

use crate::error::EngineError;
use crate::models::{ItemId, ItemRecord};

/// Which attribute of an [`ItemRecord`] a feature space is built from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum Attribute {
    /// Set-valued labels, multi-hot encoded
    Categorical(String),
    /// Sparse tag relevance scores
    Relevance,
    /// Precomputed dense vector, passed through unchanged
    Embedding(String),
}

impl Attribute {
    pub fn name(&self) -> &str {
        match self {
            Attribute::Categorical(name) | Attribute::Embedding(name) => name,
            Attribute::Relevance => "relevance",
        }
    }
}

impl Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Build-time vocabulary, frozen for the lifetime of the feature space
#[derive(Debug, Clone)]
enum Vocabulary {
    Categorical(HashMap<String, usize>),
    Tags(HashMap<u32, usize>),
    Dense,
}

/// Trims and lower-cases a categorical value; blank values are dropped
pub fn normalize_value(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_lowercase())
    }
}

/// Every item of the corpus that carries an attribute, vectorized against one vocabulary.
///
/// Row `i` of the matrix belongs to `item_ids()[i]`.
#[derive(Debug, Clone)]
pub struct FeatureSpace {
    attribute: Attribute,
    vocabulary: Vocabulary,
    dim: usize,
    item_ids: Vec<ItemId>,
    positions: HashMap<ItemId, usize>,
    vectors: Array2<f32>,
}

impl FeatureSpace {
    /// Vectorizes every record that carries `attribute`.
    ///
    /// Fails with [`EngineError::EmptyCorpus`] when no record has the attribute and
    /// with [`EngineError::DimensionMismatch`] when embeddings differ in length.
    pub fn build(corpus: &[ItemRecord], attribute: &Attribute) -> Result<Self, EngineError> {
        let mut seen = BTreeSet::new();
        let members: Vec<&ItemRecord> = corpus
            .iter()
            .filter(|record| has_attribute(record, attribute))
            .filter(|record| {
                let fresh = seen.insert(record.id);
                if !fresh {
                    tracing::warn!(item_id = record.id, %attribute, "Duplicate item id in corpus, keeping first");
                }
                fresh
            })
            .collect();

        if members.is_empty() {
            return Err(EngineError::EmptyCorpus {
                attribute: attribute.name().to_string(),
            });
        }

        let (vocabulary, dim) = match attribute {
            Attribute::Categorical(name) => {
                let values: BTreeSet<String> = members
                    .iter()
                    .filter_map(|record| record.categories.get(name))
                    .flatten()
                    .filter_map(|value| normalize_value(value))
                    .collect();
                let dim = values.len();
                let lookup = values.into_iter().enumerate().map(|(i, v)| (v, i)).collect();
                (Vocabulary::Categorical(lookup), dim)
            }
            Attribute::Relevance => {
                let tags: BTreeSet<u32> = members
                    .iter()
                    .flat_map(|record| record.relevance.keys().copied())
                    .collect();
                let dim = tags.len();
                let lookup = tags.into_iter().enumerate().map(|(i, t)| (t, i)).collect();
                (Vocabulary::Tags(lookup), dim)
            }
            Attribute::Embedding(name) => {
                let dim = members[0].embeddings[name].len();
                (Vocabulary::Dense, dim)
            }
        };

        let mut space = Self {
            attribute: attribute.clone(),
            vocabulary,
            dim,
            item_ids: Vec::with_capacity(members.len()),
            positions: HashMap::with_capacity(members.len()),
            vectors: Array2::zeros((members.len(), dim)),
        };

        for (position, record) in members.into_iter().enumerate() {
            let row = space.vectorize(record)?;
            space.vectors.row_mut(position).assign(&row);
            space.positions.insert(record.id, position);
            space.item_ids.push(record.id);
        }

        tracing::info!(
            attribute = %space.attribute,
            items = space.len(),
            dim = space.dim,
            "Feature space built"
        );

        Ok(space)
    }

    /// Vectorizes a record against the frozen vocabulary.
    ///
    /// Values the vocabulary has never seen contribute nothing.
    pub fn vectorize(&self, record: &ItemRecord) -> Result<Array1<f32>, EngineError> {
        let mut row = Array1::<f32>::zeros(self.dim);

        match (&self.vocabulary, &self.attribute) {
            (Vocabulary::Categorical(lookup), Attribute::Categorical(name)) => {
                for value in record.categories.get(name).into_iter().flatten() {
                    if let Some(&idx) = normalize_value(value).and_then(|v| lookup.get(&v)) {
                        row[idx] = 1.0;
                    }
                }
            }
            (Vocabulary::Tags(lookup), _) => {
                for (tag_id, relevance) in &record.relevance {
                    if let Some(&idx) = lookup.get(tag_id) {
                        row[idx] = *relevance;
                    }
                }
            }
            (Vocabulary::Dense, Attribute::Embedding(name)) => {
                if let Some(embedding) = record.embeddings.get(name) {
                    if embedding.len() != self.dim {
                        return Err(EngineError::DimensionMismatch {
                            item_id: record.id,
                            expected: self.dim,
                            found: embedding.len(),
                        });
                    }
                    row.assign(&ArrayView1::from(embedding.as_slice()));
                }
            }
            _ => unreachable!("vocabulary always matches its attribute"),
        }

        Ok(row)
    }

    pub fn attribute(&self) -> &Attribute {
        &self.attribute
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }

    pub fn item_ids(&self) -> &[ItemId] {
        &self.item_ids
    }

    pub fn item_id(&self, position: usize) -> ItemId {
        self.item_ids[position]
    }

    pub fn position(&self, item_id: ItemId) -> Option<usize> {
        self.positions.get(&item_id).copied()
    }

    pub fn row(&self, position: usize) -> ArrayView1<'_, f32> {
        self.vectors.row(position)
    }

    /// All rows, one per member
    pub fn vectors(&self) -> ArrayView2<'_, f32> {
        self.vectors.view()
    }
}

fn has_attribute(record: &ItemRecord, attribute: &Attribute) -> bool {
    match attribute {
        Attribute::Categorical(name) => record
            .categories
            .get(name)
            .is_some_and(|values| values.iter().any(|v| normalize_value(v).is_some())),
        Attribute::Relevance => !record.relevance.is_empty(),
        Attribute::Embedding(name) => record
            .embeddings
            .get(name)
            .is_some_and(|vector| !vector.is_empty()),
    }
}
