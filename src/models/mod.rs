pub mod item;
pub mod recommendation;
pub mod strategy;

pub use item::{ItemId, ItemRecord, COLLABORATORS, GENRES, TOPIC, VISUAL};
pub use recommendation::{RecommendationEntry, ScoredItem, SimilarityResult};
pub use strategy::Strategy;
