use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;

use crate::engine::FeatureSpace;
use crate::models::{ItemId, ScoredItem, SimilarityResult};

/// Search strategy behind a [`SimilarityIndex`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Exact,
    Approximate,
}

/// Top-k cosine neighbour search over a built [`FeatureSpace`].
///
/// Implementations are immutable once built and safe to query from many tasks.
pub trait SimilarityIndex: Send + Sync {
    fn kind(&self) -> IndexKind;

    /// The feature space this index was built from
    fn space(&self) -> &FeatureSpace;

    /// Ranked neighbours of the item at `position`, never including the item itself.
    fn query(&self, position: usize, k: usize) -> SimilarityResult;

    /// Same as [`SimilarityIndex::query`] addressed by item id; `None` if the item
    /// is not part of the space.
    fn query_item(&self, item_id: ItemId, k: usize) -> Option<SimilarityResult> {
        self.space()
            .position(item_id)
            .map(|position| self.query(position, k))
    }

    fn len(&self) -> usize {
        self.space().len()
    }

    fn is_empty(&self) -> bool {
        self.space().is_empty()
    }
}

/// Cosine similarity clamped to [-1, 1]; 0 when either vector has no magnitude
pub fn cosine_similarity(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (a.dot(&b) / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Copies the rows scaled to unit length. Zero rows stay zero.
pub fn unit_rows(vectors: ArrayView2<'_, f32>) -> Array2<f32> {
    let mut unit = vectors.to_owned();
    unit.axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|mut row| {
            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row.mapv_inplace(|x| x / norm);
            }
        });
    unit
}

/// Highest score first, ascending item id among equal scores
pub fn ranking_order(a: &ScoredItem, b: &ScoredItem) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.item_id.cmp(&b.item_id))
}

/// Keeps the best `k` candidates in ranking order
pub fn top_k(mut candidates: Vec<ScoredItem>, k: usize) -> SimilarityResult {
    if k == 0 {
        return Vec::new();
    }
    if k < candidates.len() {
        candidates.select_nth_unstable_by(k - 1, ranking_order);
        candidates.truncate(k);
    }
    candidates.sort_unstable_by(ranking_order);
    candidates
}
