use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::engine::similarity::{top_k, unit_rows, IndexKind, SimilarityIndex};
use crate::engine::FeatureSpace;
use crate::models::{ScoredItem, SimilarityResult};

/// Attempts at a separating hyperplane before falling back to a random split
const SPLIT_ATTEMPTS: usize = 3;

/// Build and search parameters for [`ApproximateNeighborIndex`]
#[derive(Debug, Clone, PartialEq)]
pub struct ForestParams {
    /// More trees improve recall at the cost of build time and memory
    pub tree_count: usize,
    /// Maximum members kept in a leaf
    pub leaf_size: usize,
    /// Candidates to gather per query; defaults to `tree_count * n`
    pub search_k: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            tree_count: 50,
            leaf_size: 32,
            search_k: None,
            seed: 42,
        }
    }
}

#[derive(Debug)]
enum Node {
    /// `normal` is `None` when the split was random; both sides are then equally near
    Split {
        normal: Option<Array1<f32>>,
        left: usize,
        right: usize,
    },
    Leaf(Vec<usize>),
}

/// Branch waiting to be expanded, ordered by its margin to the query
#[derive(Debug, PartialEq)]
struct Frontier {
    priority: f32,
    node: usize,
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Random-hyperplane forest for approximate angular nearest-neighbour search.
///
/// Every tree recursively splits the members with the hyperplane separating
/// two randomly chosen unit rows. Queries walk all trees at once, expanding the
/// branch with the largest margin first, and re-score the gathered candidates
/// with exact cosine similarity. The ranking may miss true neighbours with low
/// probability. The forest is immutable after build; adding items requires a
/// rebuild.
pub struct ApproximateNeighborIndex {
    space: Arc<FeatureSpace>,
    rows: Array2<f32>,
    nodes: Vec<Node>,
    roots: Vec<usize>,
    params: ForestParams,
}

impl ApproximateNeighborIndex {
    pub fn build(space: Arc<FeatureSpace>, params: ForestParams) -> Self {
        let params = ForestParams {
            tree_count: params.tree_count.max(1),
            leaf_size: params.leaf_size.max(2),
            ..params
        };
        let rows = unit_rows(space.vectors());
        let mut rng = StdRng::seed_from_u64(params.seed);

        let mut forest = Self {
            space,
            rows,
            nodes: Vec::new(),
            roots: Vec::with_capacity(params.tree_count),
            params,
        };

        for _ in 0..forest.params.tree_count {
            let root = forest.build_tree(&mut rng);
            forest.roots.push(root);
        }

        tracing::info!(
            items = forest.space.len(),
            attribute = %forest.space.attribute(),
            trees = forest.roots.len(),
            nodes = forest.nodes.len(),
            "Approximate neighbour forest built"
        );

        forest
    }

    pub fn tree_count(&self) -> usize {
        self.roots.len()
    }

    fn row(&self, position: usize) -> ArrayView1<'_, f32> {
        self.rows.row(position)
    }

    fn build_tree(&mut self, rng: &mut StdRng) -> usize {
        let root = self.nodes.len();
        self.nodes.push(Node::Leaf(Vec::new()));
        let mut pending = vec![(root, (0..self.space.len()).collect::<Vec<usize>>())];

        while let Some((slot, members)) = pending.pop() {
            if members.len() <= self.params.leaf_size {
                self.nodes[slot] = Node::Leaf(members);
                continue;
            }

            let (normal, left_members, right_members) = self.split(members, rng);
            let left = self.nodes.len();
            self.nodes.push(Node::Leaf(Vec::new()));
            let right = self.nodes.len();
            self.nodes.push(Node::Leaf(Vec::new()));
            self.nodes[slot] = Node::Split {
                normal,
                left,
                right,
            };
            pending.push((left, left_members));
            pending.push((right, right_members));
        }

        root
    }

    fn split(
        &self,
        mut members: Vec<usize>,
        rng: &mut StdRng,
    ) -> (Option<Array1<f32>>, Vec<usize>, Vec<usize>) {
        for _ in 0..SPLIT_ATTEMPTS {
            let pair: Vec<usize> = members.choose_multiple(rng, 2).copied().collect();
            let normal = &self.row(pair[0]) - &self.row(pair[1]);
            if normal.dot(&normal) == 0.0 {
                continue;
            }

            let (right, left): (Vec<usize>, Vec<usize>) = members
                .iter()
                .copied()
                .partition(|&position| normal.dot(&self.row(position)) > 0.0);
            if !left.is_empty() && !right.is_empty() {
                return (Some(normal), left, right);
            }
        }

        // Duplicates or degenerate rows: split in half at random
        members.shuffle(rng);
        let right = members.split_off(members.len() / 2);
        (None, members, right)
    }

    /// Up to `n` nearest positions to `position`, the position itself included
    fn nearest(&self, position: usize, n: usize) -> SimilarityResult {
        let query = self.row(position);
        let search_k = self
            .params
            .search_k
            .unwrap_or(self.roots.len() * n)
            .max(n);

        let mut frontier: BinaryHeap<Frontier> = self
            .roots
            .iter()
            .map(|&node| Frontier {
                priority: f32::INFINITY,
                node,
            })
            .collect();
        let mut candidates: Vec<usize> = Vec::new();

        while candidates.len() < search_k {
            let Some(Frontier { priority, node }) = frontier.pop() else {
                break;
            };
            match &self.nodes[node] {
                Node::Leaf(members) => candidates.extend_from_slice(members),
                Node::Split {
                    normal,
                    left,
                    right,
                } => {
                    let margin = normal
                        .as_ref()
                        .map_or(0.0, |normal| normal.dot(&query));
                    frontier.push(Frontier {
                        priority: priority.min(margin),
                        node: *right,
                    });
                    frontier.push(Frontier {
                        priority: priority.min(-margin),
                        node: *left,
                    });
                }
            }
        }

        candidates.sort_unstable();
        candidates.dedup();

        let scored = candidates
            .into_iter()
            .map(|other| ScoredItem {
                item_id: self.space.item_id(other),
                score: query.dot(&self.row(other)).clamp(-1.0, 1.0),
            })
            .collect();

        top_k(scored, n)
    }
}

impl SimilarityIndex for ApproximateNeighborIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Approximate
    }

    fn space(&self) -> &FeatureSpace {
        &self.space
    }

    fn query(&self, position: usize, k: usize) -> SimilarityResult {
        let own_id = self.space.item_id(position);
        // One extra slot for the query item, which is its own nearest neighbour
        self.nearest(position, k + 1)
            .into_iter()
            .filter(|scored| scored.item_id != own_id)
            .take(k)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::exact::ExactSimilarityMatrix;
    use crate::engine::Attribute;
    use crate::models::{ItemId, ItemRecord, TOPIC};
    use rand::Rng;

    fn topic_space(vectors: Vec<Vec<f32>>) -> Arc<FeatureSpace> {
        let corpus: Vec<ItemRecord> = vectors
            .into_iter()
            .enumerate()
            .map(|(i, v)| ItemRecord::new(i as ItemId + 1).with_embedding(TOPIC, v))
            .collect();
        Arc::new(FeatureSpace::build(&corpus, &Attribute::Embedding(TOPIC.to_string())).unwrap())
    }

    fn random_vectors(count: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
            .collect()
    }

    fn ids(result: &SimilarityResult) -> Vec<ItemId> {
        result.iter().map(|s| s.item_id).collect()
    }

    #[test]
    fn test_small_corpus_matches_exact_ranking() {
        let space = topic_space(random_vectors(20, 6, 7));
        let exact = ExactSimilarityMatrix::build(space.clone());
        let approx = ApproximateNeighborIndex::build(space, ForestParams::default());

        for position in 0..20 {
            assert_eq!(ids(&approx.query(position, 5)), ids(&exact.query(position, 5)));
        }
    }

    #[test]
    fn test_query_excludes_self() {
        let space = topic_space(random_vectors(300, 8, 11));
        let params = ForestParams {
            tree_count: 10,
            leaf_size: 16,
            ..ForestParams::default()
        };
        let index = ApproximateNeighborIndex::build(space, params);

        for position in (0..300).step_by(17) {
            let own_id = position as ItemId + 1;
            let result = index.query(position, 10);
            assert!(result.len() <= 10);
            assert!(!ids(&result).contains(&own_id));
            assert!(result.windows(2).all(|pair| pair[0].score >= pair[1].score));
        }
    }

    #[test]
    fn test_finds_planted_near_duplicates() {
        let mut vectors = random_vectors(200, 16, 3);
        let originals = vectors.clone();
        for vector in originals.iter().take(20) {
            vectors.push(vector.iter().map(|x| x * 1.01 + 0.001).collect());
        }
        let space = topic_space(vectors);
        let params = ForestParams {
            tree_count: 20,
            leaf_size: 16,
            ..ForestParams::default()
        };
        let index = ApproximateNeighborIndex::build(space, params);

        for position in 0..20 {
            let twin_id = (200 + position) as ItemId + 1;
            assert_eq!(index.query(position, 1)[0].item_id, twin_id);
        }
    }

    #[test]
    fn test_k_beyond_corpus_returns_all_others() {
        let space = topic_space(random_vectors(5, 3, 1));
        let index = ApproximateNeighborIndex::build(space, ForestParams::default());

        let result = index.query(2, 50);
        assert_eq!(result.len(), 4);
        assert!(!ids(&result).contains(&3));
    }

    #[test]
    fn test_identical_vectors_are_split_at_random() {
        let space = topic_space(vec![vec![1.0, 0.0]; 40]);
        let params = ForestParams {
            tree_count: 3,
            leaf_size: 4,
            ..ForestParams::default()
        };
        let index = ApproximateNeighborIndex::build(space, params);

        let result = index.query(0, 5);
        assert_eq!(result.len(), 5);
        assert!(result.iter().all(|s| (s.score - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_same_seed_builds_same_forest() {
        let vectors = random_vectors(120, 5, 9);
        let params = ForestParams {
            tree_count: 4,
            leaf_size: 8,
            search_k: Some(30),
            seed: 1234,
        };
        let a = ApproximateNeighborIndex::build(topic_space(vectors.clone()), params.clone());
        let b = ApproximateNeighborIndex::build(topic_space(vectors), params);

        for position in 0..120 {
            assert_eq!(ids(&a.query(position, 5)), ids(&b.query(position, 5)));
        }
    }
}
