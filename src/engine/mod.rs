pub mod approximate;
pub mod exact;
pub mod similarity;
pub mod vectorizer;

use std::sync::Arc;

pub use approximate::{ApproximateNeighborIndex, ForestParams};
pub use exact::ExactSimilarityMatrix;
pub use similarity::{cosine_similarity, IndexKind, SimilarityIndex};
pub use vectorizer::{Attribute, FeatureSpace};

use crate::error::EngineError;
use crate::models::ItemRecord;

/// Vectorizes `attribute` over the corpus and builds the requested index on top.
///
/// Synchronous and CPU-bound; callers decide where it runs.
pub fn build_index(
    corpus: &[ItemRecord],
    attribute: &Attribute,
    kind: IndexKind,
    params: ForestParams,
) -> Result<Arc<dyn SimilarityIndex>, EngineError> {
    let space = Arc::new(FeatureSpace::build(corpus, attribute)?);

    let index: Arc<dyn SimilarityIndex> = match kind {
        IndexKind::Exact => Arc::new(ExactSimilarityMatrix::build(space)),
        IndexKind::Approximate => Arc::new(ApproximateNeighborIndex::build(space, params)),
    };

    Ok(index)
}
