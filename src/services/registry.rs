use serde::Serialize;
use std::collections::BTreeMap;

use crate::engine::{Attribute, IndexKind};
use crate::models::{Strategy, COLLABORATORS, GENRES, TOPIC, VISUAL};

/// Where the dispatcher looks first for a strategy's answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Serving {
    /// Read from the recommendation store; a live index is only used if one is already built
    Precomputed,
    /// Kept in memory and queried directly; built on first request
    Live,
}

/// What the dispatcher returns when neither the store nor a live index can answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    RandomBaseline,
    Empty,
}

/// Everything needed to build and serve one strategy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyBundle {
    pub strategy: Strategy,
    /// `None` for strategies that have no feature space (random baseline)
    pub attribute: Option<Attribute>,
    pub index: IndexKind,
    pub serving: Serving,
    pub fallback: Fallback,
}

impl StrategyBundle {
    pub fn new(strategy: Strategy, attribute: Attribute, index: IndexKind) -> Self {
        Self {
            strategy,
            attribute: Some(attribute),
            index,
            serving: Serving::Precomputed,
            fallback: Fallback::RandomBaseline,
        }
    }

    pub fn random_baseline() -> Self {
        Self {
            strategy: Strategy::Random,
            attribute: None,
            index: IndexKind::Exact,
            serving: Serving::Live,
            fallback: Fallback::Empty,
        }
    }

    pub fn served(mut self, serving: Serving) -> Self {
        self.serving = serving;
        self
    }

    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = fallback;
        self
    }
}

/// Explicit strategy table
#[derive(Debug, Clone, Default)]
pub struct StrategyRegistry {
    bundles: BTreeMap<Strategy, StrategyBundle>,
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registers a bundle, replacing any earlier one for the same strategy
    pub fn register(mut self, bundle: StrategyBundle) -> Self {
        self.bundles.insert(bundle.strategy, bundle);
        self
    }

    pub fn get(&self, strategy: Strategy) -> Option<&StrategyBundle> {
        self.bundles.get(&strategy)
    }

    pub fn bundles(&self) -> impl Iterator<Item = &StrategyBundle> {
        self.bundles.values()
    }

    /// Strategies whose live index should be warmed at startup
    pub fn live_strategies(&self) -> Vec<Strategy> {
        self.bundles
            .values()
            .filter(|bundle| bundle.serving == Serving::Live && bundle.attribute.is_some())
            .map(|bundle| bundle.strategy)
            .collect()
    }

    /// The production strategy table.
    ///
    /// Embedding strategies use the approximate forest and are served from the
    /// store; categorical strategies use the exact matrix; tag relevance is kept
    /// in memory and answered live.
    pub fn standard() -> Self {
        Self::empty()
            .register(StrategyBundle::random_baseline())
            .register(StrategyBundle::new(
                Strategy::Visual,
                Attribute::Embedding(VISUAL.to_string()),
                IndexKind::Approximate,
            ))
            .register(StrategyBundle::new(
                Strategy::Genre,
                Attribute::Categorical(GENRES.to_string()),
                IndexKind::Exact,
            ))
            .register(StrategyBundle::new(
                Strategy::Collaborators,
                Attribute::Categorical(COLLABORATORS.to_string()),
                IndexKind::Exact,
            ))
            .register(StrategyBundle::new(
                Strategy::Plot,
                Attribute::Embedding(TOPIC.to_string()),
                IndexKind::Approximate,
            ))
            .register(
                StrategyBundle::new(Strategy::Tag, Attribute::Relevance, IndexKind::Exact)
                    .served(Serving::Live),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_covers_every_strategy() {
        let registry = StrategyRegistry::standard();
        for strategy in Strategy::ALL {
            assert!(registry.get(strategy).is_some(), "{} missing", strategy);
        }
    }

    #[test]
    fn test_live_strategies() {
        assert_eq!(
            StrategyRegistry::standard().live_strategies(),
            vec![Strategy::Tag]
        );
    }

    #[test]
    fn test_register_replaces_bundle() {
        let registry = StrategyRegistry::standard().register(
            StrategyBundle::new(
                Strategy::Genre,
                Attribute::Categorical(GENRES.to_string()),
                IndexKind::Approximate,
            )
            .with_fallback(Fallback::Empty),
        );

        let genre = registry.get(Strategy::Genre).unwrap();
        assert_eq!(genre.index, IndexKind::Approximate);
        assert_eq!(genre.fallback, Fallback::Empty);
    }

    #[test]
    fn test_random_baseline_has_no_feature_space() {
        let registry = StrategyRegistry::standard();
        assert_eq!(registry.get(Strategy::Random).unwrap().attribute, None);
        assert_eq!(
            registry.get(Strategy::Tag).unwrap().attribute,
            Some(Attribute::Relevance)
        );
    }
}
