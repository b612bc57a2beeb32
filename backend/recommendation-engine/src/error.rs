use crate::models::{ItemId, UserId};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecommendError>;

/// Request-level failures surfaced to the caller.
#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("Unknown strategy '{name}'. Valid strategies: {available}")]
    UnknownStrategy { name: String, available: String },

    #[error("Strategy '{0}' is already registered")]
    DuplicateStrategy(String),

    #[error("No active items in catalog")]
    NoCatalogData,

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Catalog source error: {0}")]
    Source(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<anyhow::Error> for RecommendError {
    fn from(err: anyhow::Error) -> Self {
        RecommendError::Source(err.to_string())
    }
}

impl From<envy::Error> for RecommendError {
    fn from(err: envy::Error) -> Self {
        RecommendError::Configuration(err.to_string())
    }
}

/// Why an input row was rejected at ingestion.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum ValidationError {
    #[error("Rating value must be between 1 and 5, got {value}")]
    RatingOutOfRange { value: i32 },

    #[error("Duplicate rating for user {user_id} and item {item_id}")]
    DuplicateRating { user_id: UserId, item_id: ItemId },

    #[error("Category cannot be empty (item {item_id})")]
    BlankCategory { item_id: ItemId },

    #[error("Popularity must be a finite value >= 0, got {value} (item {item_id})")]
    InvalidPopularity { item_id: ItemId, value: f64 },

    #[error("Duplicate item {item_id}")]
    DuplicateItem { item_id: ItemId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Rating,
    Item,
}

/// Diagnostic for one rejected input row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRecord {
    /// Position of the row in the input sequence
    pub index: usize,
    pub kind: RecordKind,
    pub error: ValidationError,
}

/// Result of an ingestion pass: the built value plus the rows that were dropped.
#[derive(Debug, Clone)]
pub struct IngestReport<T> {
    pub value: T,
    pub rejected: Vec<RejectedRecord>,
}

impl<T> IngestReport<T> {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RecommendError::UnknownStrategy {
            name: "magic".to_string(),
            available: "collaborative, hybrid".to_string(),
        };
        assert!(err.to_string().contains("magic"));
        assert!(err.to_string().contains("collaborative, hybrid"));

        let err = ValidationError::RatingOutOfRange { value: 6 };
        assert_eq!(err.to_string(), "Rating value must be between 1 and 5, got 6");
    }
}
