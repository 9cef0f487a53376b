use ndarray::{Array2, Axis};
use rayon::prelude::*;
use std::sync::Arc;

use crate::engine::similarity::{top_k, unit_rows, IndexKind, SimilarityIndex};
use crate::engine::FeatureSpace;
use crate::models::{ScoredItem, SimilarityResult};

/// Dense all-pairs cosine similarity matrix.
///
/// Memory is N² scores, so this is meant for corpora of up to a few tens of
/// thousands of items. Any corpus change requires a full rebuild.
pub struct ExactSimilarityMatrix {
    space: Arc<FeatureSpace>,
    scores: Array2<f32>,
}

impl ExactSimilarityMatrix {
    pub fn build(space: Arc<FeatureSpace>) -> Self {
        let n = space.len();
        let unit = unit_rows(space.vectors());
        let mut scores = Array2::<f32>::zeros((n, n));

        scores
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(i, mut row)| {
                row.assign(&unit.dot(&unit.row(i)));
                row.mapv_inplace(|score| score.clamp(-1.0, 1.0));
            });

        tracing::info!(items = n, attribute = %space.attribute(), "Exact similarity matrix built");

        Self { space, scores }
    }

    /// Cosine similarity between the items at two positions
    pub fn score(&self, a: usize, b: usize) -> f32 {
        self.scores[[a, b]]
    }
}

impl SimilarityIndex for ExactSimilarityMatrix {
    fn kind(&self) -> IndexKind {
        IndexKind::Exact
    }

    fn space(&self) -> &FeatureSpace {
        &self.space
    }

    fn query(&self, position: usize, k: usize) -> SimilarityResult {
        let candidates = self
            .scores
            .row(position)
            .iter()
            .enumerate()
            .filter(|(other, _)| *other != position)
            .map(|(other, &score)| ScoredItem {
                item_id: self.space.item_id(other),
                score,
            })
            .collect();

        top_k(candidates, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Attribute;
    use crate::models::{ItemId, ItemRecord, GENRES};

    fn build(corpus: &[ItemRecord]) -> ExactSimilarityMatrix {
        let space =
            FeatureSpace::build(corpus, &Attribute::Categorical(GENRES.to_string())).unwrap();
        ExactSimilarityMatrix::build(Arc::new(space))
    }

    fn ids(result: &SimilarityResult) -> Vec<ItemId> {
        result.iter().map(|s| s.item_id).collect()
    }

    fn scenario() -> Vec<ItemRecord> {
        vec![
            ItemRecord::new(1).with_category(GENRES, ["A", "B"]),
            ItemRecord::new(2).with_category(GENRES, ["A"]),
            ItemRecord::new(3).with_category(GENRES, ["B"]),
            ItemRecord::new(4).with_category(GENRES, ["A", "B"]),
        ]
    }

    #[test]
    fn test_genre_scenario_scores() {
        let index = build(&scenario());

        assert!((index.score(0, 3) - 1.0).abs() < 1e-6);
        assert!((index.score(0, 1) - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!((index.score(0, 2) - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_genre_scenario_ranking() {
        let index = build(&scenario());

        assert_eq!(ids(&index.query_item(1, 2).unwrap()), vec![4, 2]);
        assert_eq!(ids(&index.query_item(1, 3).unwrap()), vec![4, 2, 3]);
    }

    #[test]
    fn test_query_excludes_self_and_caps_at_corpus() {
        let index = build(&scenario());

        for item_id in 1..=4 {
            let result = index.query_item(item_id, 10).unwrap();
            assert_eq!(result.len(), 3);
            assert!(!ids(&result).contains(&item_id));
        }
    }

    #[test]
    fn test_smaller_k_is_prefix_of_larger_k() {
        let corpus: Vec<ItemRecord> = (1..=12)
            .map(|id| {
                let genres: Vec<String> = (0..4)
                    .filter(|bit| (id >> bit) & 1 == 1)
                    .map(|bit| format!("g{}", bit))
                    .collect();
                ItemRecord::new(id).with_category(GENRES, genres)
            })
            .collect();
        let index = build(&corpus);

        for item_id in 1..=12 {
            let full = ids(&index.query_item(item_id, 11).unwrap());
            for k in 1..11 {
                let partial = ids(&index.query_item(item_id, k).unwrap());
                assert_eq!(partial, full[..k].to_vec());
            }
        }
    }

    #[test]
    fn test_identical_vectors_score_identically() {
        let corpus = vec![
            ItemRecord::new(1).with_category(GENRES, ["drama"]),
            ItemRecord::new(7).with_category(GENRES, ["comedy", "drama"]),
            ItemRecord::new(5).with_category(GENRES, ["comedy", "drama"]),
            ItemRecord::new(3).with_category(GENRES, ["comedy"]),
        ];
        let index = build(&corpus);

        for third in [0, 3] {
            assert_eq!(index.score(1, third), index.score(2, third));
        }
        // Items 7 and 5 tie against item 1, so the lower id comes first
        assert_eq!(ids(&index.query_item(1, 3).unwrap()), vec![5, 7, 3]);
    }

    #[test]
    fn test_unknown_item() {
        let index = build(&scenario());
        assert!(index.query_item(42, 3).is_none());
    }

    #[test]
    fn test_scores_within_bounds() {
        let index = build(&scenario());
        for a in 0..4 {
            for b in 0..4 {
                let score = index.score(a, b);
                assert!((-1.0..=1.0).contains(&score));
            }
        }
    }
}
