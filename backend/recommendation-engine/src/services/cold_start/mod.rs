// ============================================
// Cold Start Handler (冷啟動推薦)
// ============================================
//
// For users with little or no history:
// 1. Items in a category the user declared interest in come first
// 2. Then by catalog popularity (descending)
// 3. Then by ItemId (ascending)
//
// Score = popularity / max popularity, +1.0 on a category match.
// Order is taken from (match, popularity, id), not from the score:
// a matching item with popularity 0 still outranks every non-match.
// Never empty while the catalog has an active item.

use crate::error::{RecommendError, Result};
use crate::models::{
    Candidate, CandidateSource, Evidence, ItemId, UserId, UserPreferences, MAX_RATING,
};
use crate::services::matrix::InteractionMatrix;
use crate::services::recall::{ScoringStrategy, StrategyContext};
use crate::services::snapshot::Snapshot;
use crate::utils::by_score_desc;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const CATEGORY_MATCH_BONUS: f64 = 1.0;

/// Weight of the mean rating in recomputed popularity
const RATING_WEIGHT: f64 = 0.7;
/// Weight of the rating count in recomputed popularity
const VOLUME_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, Copy, Default)]
pub struct ColdStartHandler;

impl ColdStartHandler {
    pub fn new() -> Self {
        Self
    }

    /// Rank every active catalog item for a user without usable history.
    pub fn rank(&self, snapshot: &Snapshot, preferences: &UserPreferences) -> Result<Vec<Candidate>> {
        if !snapshot.has_active_items() {
            warn!("Cold start requested but catalog has no active items");
            return Err(RecommendError::NoCatalogData);
        }

        let preferred = preferences.preferred_categories();
        let max_popularity = snapshot
            .active_items()
            .map(|item| item.popularity)
            .fold(0.0_f64, f64::max);

        let mut ranked: Vec<(bool, f64, Candidate)> = snapshot
            .active_items()
            .map(|item| {
                let popularity_score = if max_popularity > 0.0 {
                    item.popularity / max_popularity
                } else {
                    0.0
                };
                let category_match = preferred.contains(&item.category.trim().to_lowercase());

                let mut candidate = Candidate::new(
                    item.item_id,
                    popularity_score + if category_match { CATEGORY_MATCH_BONUS } else { 0.0 },
                    CandidateSource::ColdStart,
                );
                if category_match {
                    candidate = candidate.with_evidence(Evidence::CategoryMatch {
                        category: item.category.clone(),
                    });
                }
                let candidate = candidate.with_evidence(Evidence::Popularity {
                    popularity: item.popularity,
                });
                (category_match, item.popularity, candidate)
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| by_score_desc((a.1, a.2.item_id), (b.1, b.2.item_id)))
        });
        let candidates: Vec<Candidate> = ranked.into_iter().map(|(_, _, c)| c).collect();

        debug!(
            candidates = candidates.len(),
            preferred_categories = preferred.len(),
            "Cold start ranking computed"
        );

        Ok(candidates)
    }
}

impl ScoringStrategy for ColdStartHandler {
    fn name(&self) -> &str {
        "cold-start"
    }

    fn source(&self) -> CandidateSource {
        CandidateSource::ColdStart
    }

    fn score(&self, ctx: &StrategyContext<'_>, user_id: UserId) -> Vec<Candidate> {
        match self.rank(ctx.snapshot, ctx.preferences) {
            Ok(candidates) => candidates,
            Err(e) => {
                debug!(user_id, error = %e, "Cold start produced no candidates");
                Vec::new()
            }
        }
    }
}

/// Popularity derived from ratings, on the 0..5 scale.
///
/// `clamp(0.7 · mean/5 + 0.3 · min(1, 0.1 · (1 + count) / 2), 0, 1) · 5`
pub fn popularity_from_ratings(mean: f64, count: usize) -> f64 {
    let max = MAX_RATING as f64;
    let quality = mean / max;
    let volume = (0.1 * (1.0 + count as f64) / 2.0).min(1.0);
    (RATING_WEIGHT * quality + VOLUME_WEIGHT * volume).clamp(0.0, 1.0) * max
}

/// Recomputed popularity for every catalog item; 0 for unrated items.
pub fn recompute_popularity(
    matrix: &InteractionMatrix,
    items: impl IntoIterator<Item = ItemId>,
) -> BTreeMap<ItemId, f64> {
    items
        .into_iter()
        .map(|item_id| {
            let popularity = matrix
                .item_stats(item_id)
                .map(|stats| popularity_from_ratings(stats.mean, stats.count))
                .unwrap_or(0.0);
            (item_id, popularity)
        })
        .collect()
}
