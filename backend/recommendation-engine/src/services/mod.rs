pub mod cold_start;
pub mod diversity;
pub mod events;
pub mod explanation;
pub mod features;
pub mod matrix;
pub mod recall;
pub mod registry;
pub mod similarity;
pub mod snapshot;

pub use cold_start::ColdStartHandler;
pub use diversity::DiversityOptimizer;
pub use events::{ActivityRecorder, EventSink, RecommendationEvent};
pub use explanation::ExplanationGenerator;
pub use features::FeatureVectorizer;
pub use matrix::InteractionMatrix;
pub use recall::{ScoringStrategy, StrategyContext};
pub use registry::StrategyRegistry;
pub use similarity::{SimilarityEngine, SimilarityMetric};
pub use snapshot::{CatalogSource, InMemoryCatalog, Snapshot, SnapshotCache};
