mod collaborative;
mod content;
mod hybrid;

#[cfg(test)]
pub(crate) mod fixtures;

use crate::models::{Candidate, CandidateSource, UserId, UserPreferences};
use crate::services::snapshot::Snapshot;

pub use collaborative::CollaborativeStrategy;
pub use content::ContentStrategy;
pub use hybrid::HybridStrategy;

/// Everything a strategy may read for one request.
pub struct StrategyContext<'a> {
    pub snapshot: &'a Snapshot,
    pub preferences: &'a UserPreferences,
}

impl<'a> StrategyContext<'a> {
    pub fn new(snapshot: &'a Snapshot, preferences: &'a UserPreferences) -> Self {
        Self {
            snapshot,
            preferences,
        }
    }
}

/// 召回策略：為單一用戶產生排序後的候選集
///
/// Implementations are pure over the context: same snapshot, same user,
/// same output. Results are sorted by score descending, ItemId ascending.
pub trait ScoringStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn source(&self) -> CandidateSource;
    fn score(&self, ctx: &StrategyContext<'_>, user_id: UserId) -> Vec<Candidate>;
}
