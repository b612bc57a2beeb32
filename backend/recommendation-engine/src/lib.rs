pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod models;
pub mod services;
pub mod utils;

pub use config::{EngineConfig, RecommendOptions};
pub use engine::RecommendationEngine;
pub use error::{RecommendError, Result};
pub use services::{
    ActivityRecorder, CatalogSource, EventSink, InMemoryCatalog, ScoringStrategy, Snapshot,
};
