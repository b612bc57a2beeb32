use super::{CollaborativeStrategy, ContentStrategy, ScoringStrategy, StrategyContext};
use crate::config::RecommendOptions;
use crate::models::{Candidate, CandidateSource, ItemId, UserId};
use crate::utils::{normalize_score, score_bounds, sort_candidates};
use std::collections::BTreeMap;
use tracing::info;

/// Linear blend of collaborative and content scores
///
/// Each side is min-max normalized over its own candidates before
/// blending, so the two score scales (ratings vs cosine) are comparable.
pub struct HybridStrategy {
    collaborative: CollaborativeStrategy,
    content: ContentStrategy,
    collab_weight: f64,
    content_weight: f64,
}

impl HybridStrategy {
    /// Weights are expected to be validated; they are renormalized to sum to 1.
    pub fn new(
        collaborative: CollaborativeStrategy,
        content: ContentStrategy,
        collab_weight: f64,
        content_weight: f64,
    ) -> Self {
        let total = collab_weight + content_weight;
        let (collab_weight, content_weight) = if total > 0.0 && total.is_finite() {
            (collab_weight / total, content_weight / total)
        } else {
            (0.5, 0.5)
        };

        Self {
            collaborative,
            content,
            collab_weight,
            content_weight,
        }
    }

    pub fn from_options(options: &RecommendOptions) -> Self {
        let (collab_weight, content_weight) = options.normalized_weights();
        Self::new(
            CollaborativeStrategy::from_options(options),
            ContentStrategy::from_options(options),
            collab_weight,
            content_weight,
        )
    }

    pub fn weights(&self) -> (f64, f64) {
        (self.collab_weight, self.content_weight)
    }
}

fn normalized(candidates: &[Candidate]) -> BTreeMap<ItemId, f64> {
    let Some((min, max)) = score_bounds(candidates) else {
        return BTreeMap::new();
    };
    candidates
        .iter()
        .map(|c| (c.item_id, normalize_score(c.raw_score, min, max)))
        .collect()
}

impl ScoringStrategy for HybridStrategy {
    fn name(&self) -> &str {
        "hybrid"
    }

    fn source(&self) -> CandidateSource {
        CandidateSource::Hybrid
    }

    fn score(&self, ctx: &StrategyContext<'_>, user_id: UserId) -> Vec<Candidate> {
        let collab = self.collaborative.score(ctx, user_id);
        let content = self.content.score(ctx, user_id);

        if collab.is_empty() && content.is_empty() {
            return Vec::new();
        }

        let collab_scores = normalized(&collab);
        let content_scores = normalized(&content);

        let mut merged: BTreeMap<ItemId, Candidate> = BTreeMap::new();
        for candidate in collab.into_iter().chain(content) {
            let entry = merged
                .entry(candidate.item_id)
                .or_insert_with(|| Candidate::new(candidate.item_id, 0.0, CandidateSource::Hybrid));
            entry.evidence.extend(candidate.evidence);
        }

        for (item_id, candidate) in merged.iter_mut() {
            let c = collab_scores.get(item_id).copied();
            let t = content_scores.get(item_id).copied();
            candidate.raw_score = match (c, t) {
                (Some(c), Some(t)) => self.collab_weight * c + self.content_weight * t,
                // one side only: weight renormalized over the sides present
                (Some(c), None) if self.collab_weight > 0.0 => c,
                (None, Some(t)) if self.content_weight > 0.0 => t,
                _ => 0.0,
            };
        }

        let mut candidates: Vec<Candidate> = merged.into_values().collect();
        sort_candidates(&mut candidates);

        info!(
            user_id,
            collaborative = collab_scores.len(),
            content = content_scores.len(),
            merged = candidates.len(),
            "Hybrid blend completed"
        );

        candidates
    }
}
