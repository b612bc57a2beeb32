use super::{ScoringStrategy, StrategyContext};
use crate::config::RecommendOptions;
use crate::models::{Candidate, CandidateSource, Evidence, ItemId, UserId};
use crate::services::similarity::SimilarityMetric;
use crate::utils::sort_candidates;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// User-based Collaborative Filtering
///
/// Algorithm:
/// 1. Find up to K users similar to the target (similarity > 0, enough co-rated items)
/// 2. Collect active items those neighbors rated that the target has not
/// 3. Score = Σ(sim · rating) / Σ(sim) over neighbors who rated the item
///
/// Evidence is the neighbor with the largest sim · rating contribution.
pub struct CollaborativeStrategy {
    neighbor_k: usize,
    metric: SimilarityMetric,
    min_co_rated: usize,
}

#[derive(Default)]
struct Accumulator {
    weighted_sum: f64,
    similarity_sum: f64,
    best: Option<(f64, Evidence)>,
}

impl CollaborativeStrategy {
    pub fn new(neighbor_k: usize, metric: SimilarityMetric, min_co_rated: usize) -> Self {
        Self {
            neighbor_k,
            metric,
            min_co_rated,
        }
    }

    pub fn from_options(options: &RecommendOptions) -> Self {
        Self::new(
            options.neighbor_k,
            options.similarity_metric,
            options.min_co_rated,
        )
    }
}

impl ScoringStrategy for CollaborativeStrategy {
    fn name(&self) -> &str {
        "collaborative"
    }

    fn source(&self) -> CandidateSource {
        CandidateSource::Collaborative
    }

    fn score(&self, ctx: &StrategyContext<'_>, user_id: UserId) -> Vec<Candidate> {
        let snapshot = ctx.snapshot;
        let matrix = &snapshot.matrix;

        if matrix.row(user_id).is_empty() {
            debug!(user_id, "No ratings, skipping collaborative filtering");
            return Vec::new();
        }

        let neighbors = snapshot.similarity().user_neighbors(
            user_id,
            self.neighbor_k,
            self.metric,
            self.min_co_rated,
        );

        let mut scores: BTreeMap<ItemId, Accumulator> = BTreeMap::new();
        for neighbor in &neighbors {
            for (&item_id, &rating) in matrix.row(neighbor.id) {
                if matrix.has_rated(user_id, item_id) || !snapshot.is_active(item_id) {
                    continue;
                }

                let contribution = neighbor.score * rating;
                let acc = scores.entry(item_id).or_default();
                acc.weighted_sum += contribution;
                acc.similarity_sum += neighbor.score;

                // neighbors arrive in rank order, so ties keep the closer one
                if acc.best.as_ref().map_or(true, |(best, _)| contribution > *best) {
                    acc.best = Some((
                        contribution,
                        Evidence::Neighbor {
                            user_id: neighbor.id,
                            similarity: neighbor.score,
                            rating,
                        },
                    ));
                }
            }
        }

        let mut candidates: Vec<Candidate> = scores
            .into_iter()
            .filter(|(_, acc)| acc.similarity_sum > 0.0)
            .map(|(item_id, acc)| {
                let candidate = Candidate::new(
                    item_id,
                    acc.weighted_sum / acc.similarity_sum,
                    CandidateSource::Collaborative,
                );
                match acc.best {
                    Some((_, evidence)) => candidate.with_evidence(evidence),
                    None => candidate,
                }
            })
            .collect();

        sort_candidates(&mut candidates);

        info!(
            user_id,
            neighbors = neighbors.len(),
            candidates = candidates.len(),
            "Collaborative filtering completed"
        );

        candidates
    }
}
