use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

/// Recommendation strategies the dispatcher can serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Uniform sample of the catalog
    Random,
    /// Poster embedding neighbours
    Visual,
    /// Genre overlap
    Genre,
    /// Shared directors and lead actors
    Collaborators,
    /// Plot topic-model neighbours
    Plot,
    /// Relevance-weighted descriptive tags
    Tag,
}

impl Strategy {
    pub const ALL: [Strategy; 6] = [
        Strategy::Random,
        Strategy::Visual,
        Strategy::Genre,
        Strategy::Collaborators,
        Strategy::Plot,
        Strategy::Tag,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Random => "random",
            Strategy::Visual => "visual",
            Strategy::Genre => "genre",
            Strategy::Collaborators => "collaborators",
            Strategy::Plot => "plot",
            Strategy::Tag => "tag",
        }
    }

    /// Numeric id used by the legacy web frontend
    pub fn legacy_id(&self) -> u8 {
        match self {
            Strategy::Random => 1,
            Strategy::Visual => 2,
            Strategy::Genre => 3,
            Strategy::Collaborators => 4,
            Strategy::Plot => 5,
            Strategy::Tag => 6,
        }
    }
}

impl Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    /// Accepts the strategy name (any case) or its legacy numeric id
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Strategy::ALL
            .into_iter()
            .find(|strategy| {
                strategy.as_str() == normalized || strategy.legacy_id().to_string() == normalized
            })
            .ok_or_else(|| format!("Unknown strategy: {}", s))
    }
}
