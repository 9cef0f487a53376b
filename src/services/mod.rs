pub mod catalog;
pub mod context;
pub mod dispatcher;
pub mod pipeline;
pub mod registry;

pub use catalog::{CorpusSource, InMemoryCorpus, JsonCorpus};
pub use context::{EngineContext, EngineSettings, IndexSummary, LiveIndex};
pub use dispatcher::{DispatchOutcome, RecommendationSource, StrategyDispatcher};
pub use pipeline::{PipelineOptions, PipelineReport, PrecomputationPipeline};
pub use registry::{Fallback, Serving, StrategyBundle, StrategyRegistry};
