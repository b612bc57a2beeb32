use crate::error::{RecommendError, Result};
use crate::models::{MAX_RATING, MIN_RATING};
use crate::services::similarity::SimilarityMetric;
use serde::{Deserialize, Serialize};

/// Engine defaults, read from `RECOMMENDER_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_strategy")]
    pub default_strategy: String,
    #[serde(default = "default_top_n")]
    pub default_top_n: usize,
    #[serde(default)]
    pub diversity_lambda: f64,
    #[serde(default = "default_weight")]
    pub collab_weight: f64,
    #[serde(default = "default_weight")]
    pub content_weight: f64,
    #[serde(default = "default_min_result_threshold")]
    pub min_result_threshold: usize,
    #[serde(default = "default_neighbor_k")]
    pub neighbor_k: usize,
    #[serde(default = "default_min_co_rated")]
    pub min_co_rated: usize,
    #[serde(default = "default_liked_threshold")]
    pub liked_threshold: i32,
    #[serde(default)]
    pub similarity_metric: SimilarityMetric,
}

fn default_strategy() -> String {
    "hybrid".to_string()
}

fn default_top_n() -> usize {
    10
}

fn default_weight() -> f64 {
    0.5
}

fn default_min_result_threshold() -> usize {
    5
}

fn default_neighbor_k() -> usize {
    20
}

fn default_min_co_rated() -> usize {
    2
}

fn default_liked_threshold() -> i32 {
    4
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_strategy: default_strategy(),
            default_top_n: default_top_n(),
            diversity_lambda: 0.0,
            collab_weight: default_weight(),
            content_weight: default_weight(),
            min_result_threshold: default_min_result_threshold(),
            neighbor_k: default_neighbor_k(),
            min_co_rated: default_min_co_rated(),
            liked_threshold: default_liked_threshold(),
            similarity_metric: SimilarityMetric::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config: EngineConfig = envy::prefixed("RECOMMENDER_").from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_strategy.trim().is_empty() {
            return Err(RecommendError::Configuration(
                "default_strategy cannot be empty".to_string(),
            ));
        }
        self.default_options()
            .validate()
            .map_err(|e| RecommendError::Configuration(e.to_string()))
    }

    /// Request options seeded from this config
    pub fn default_options(&self) -> RecommendOptions {
        RecommendOptions {
            diversity_lambda: self.diversity_lambda,
            collab_weight: self.collab_weight,
            content_weight: self.content_weight,
            min_result_threshold: self.min_result_threshold,
            neighbor_k: self.neighbor_k,
            min_co_rated: self.min_co_rated,
            liked_threshold: self.liked_threshold,
            similarity_metric: self.similarity_metric,
            category_filter: None,
            min_score: None,
        }
    }
}

/// Per-request tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecommendOptions {
    /// 0 disables diversity re-ranking
    pub diversity_lambda: f64,
    pub collab_weight: f64,
    pub content_weight: f64,
    /// Cold-start results are merged in below this many primary results
    pub min_result_threshold: usize,
    pub neighbor_k: usize,
    pub min_co_rated: usize,
    /// Ratings at or above this count as "liked" for content profiles
    pub liked_threshold: i32,
    pub similarity_metric: SimilarityMetric,
    pub category_filter: Option<String>,
    pub min_score: Option<f64>,
}

impl Default for RecommendOptions {
    fn default() -> Self {
        EngineConfig::default().default_options()
    }
}

impl RecommendOptions {
    pub fn with_diversity(mut self, lambda: f64) -> Self {
        self.diversity_lambda = lambda;
        self
    }

    pub fn with_weights(mut self, collab: f64, content: f64) -> Self {
        self.collab_weight = collab;
        self.content_weight = content;
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category_filter = Some(category.to_string());
        self
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn with_min_result_threshold(mut self, threshold: usize) -> Self {
        self.min_result_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.diversity_lambda.is_finite() || !(0.0..=1.0).contains(&self.diversity_lambda) {
            return Err(RecommendError::InvalidOptions(format!(
                "diversityLambda must be within [0, 1], got {}",
                self.diversity_lambda
            )));
        }

        for (name, weight) in [
            ("collabWeight", self.collab_weight),
            ("contentWeight", self.content_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(RecommendError::InvalidOptions(format!(
                    "{} must be a finite value >= 0, got {}",
                    name, weight
                )));
            }
        }
        if self.collab_weight + self.content_weight <= 0.0 {
            return Err(RecommendError::InvalidOptions(
                "collabWeight and contentWeight cannot both be 0".to_string(),
            ));
        }

        if !(MIN_RATING..=MAX_RATING).contains(&self.liked_threshold) {
            return Err(RecommendError::InvalidOptions(format!(
                "likedThreshold must be between {} and {}, got {}",
                MIN_RATING, MAX_RATING, self.liked_threshold
            )));
        }

        if let Some(min_score) = self.min_score {
            if !min_score.is_finite() {
                return Err(RecommendError::InvalidOptions(
                    "minScore must be finite".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Collaborative / content weights renormalized to sum to 1
    pub fn normalized_weights(&self) -> (f64, f64) {
        let total = self.collab_weight + self.content_weight;
        if total <= 0.0 {
            return (0.5, 0.5);
        }
        (self.collab_weight / total, self.content_weight / total)
    }
}
