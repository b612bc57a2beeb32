use super::{ScoringStrategy, StrategyContext};
use crate::config::RecommendOptions;
use crate::models::{Candidate, CandidateSource, Evidence, ItemId, UserId};
use crate::services::similarity::dense_cosine;
use crate::utils::sort_candidates;
use tracing::{debug, info};

/// Content-based recall
///
/// Builds a taste profile as the rating-weighted average of the feature
/// vectors of items the user liked, then scores every active unrated item
/// by cosine similarity to that profile.
pub struct ContentStrategy {
    liked_threshold: i32,
}

impl ContentStrategy {
    pub fn new(liked_threshold: i32) -> Self {
        Self { liked_threshold }
    }

    pub fn from_options(options: &RecommendOptions) -> Self {
        Self::new(options.liked_threshold)
    }
}

impl ScoringStrategy for ContentStrategy {
    fn name(&self) -> &str {
        "content-based"
    }

    fn source(&self) -> CandidateSource {
        CandidateSource::Content
    }

    fn score(&self, ctx: &StrategyContext<'_>, user_id: UserId) -> Vec<Candidate> {
        let snapshot = ctx.snapshot;
        let features = &snapshot.features;
        let dims = features.schema.dimensions();

        // (item, rating, vector) for liked items that have a vector
        let liked: Vec<(ItemId, f64, &[f64])> = snapshot
            .matrix
            .row(user_id)
            .iter()
            .filter(|(_, rating)| **rating >= self.liked_threshold as f64)
            .filter_map(|(item_id, rating)| {
                features
                    .vector(*item_id)
                    .map(|v| (*item_id, *rating, v.values.as_slice()))
            })
            .collect();

        if liked.is_empty() || dims == 0 {
            debug!(user_id, "No liked items with features, skipping content recall");
            return Vec::new();
        }

        let mut profile = vec![0.0; dims];
        let total_weight: f64 = liked.iter().map(|(_, rating, _)| rating).sum();
        for (_, rating, vector) in &liked {
            for (p, v) in profile.iter_mut().zip(vector.iter()) {
                *p += rating * v;
            }
        }
        for p in profile.iter_mut() {
            *p /= total_weight;
        }

        let mut candidates: Vec<Candidate> = snapshot
            .active_items()
            .filter(|item| !snapshot.matrix.has_rated(user_id, item.item_id))
            .filter_map(|item| {
                let vector = features.vector(item.item_id)?;
                let score = dense_cosine(&profile, &vector.values);
                let mut candidate = Candidate::new(item.item_id, score, CandidateSource::Content);

                // strongest shared dimension
                let top_dimension = profile
                    .iter()
                    .zip(vector.values.iter())
                    .map(|(p, v)| p * v)
                    .enumerate()
                    .filter(|(_, product)| *product > 0.0)
                    .fold(None, |best: Option<(usize, f64)>, (i, product)| match best {
                        Some((_, b)) if b >= product => best,
                        _ => Some((i, product)),
                    });

                // liked item closest to the candidate
                let anchor = liked
                    .iter()
                    .map(|(liked_id, _, liked_vector)| {
                        (*liked_id, dense_cosine(liked_vector, &vector.values))
                    })
                    .filter(|(_, sim)| *sim > 0.0)
                    .fold(None, |best: Option<(ItemId, f64)>, (id, sim)| match best {
                        Some((_, b)) if b >= sim => best,
                        _ => Some((id, sim)),
                    });

                if top_dimension.is_some() || anchor.is_some() {
                    candidate = candidate.with_evidence(Evidence::FeatureOverlap {
                        feature: top_dimension
                            .and_then(|(i, _)| features.schema.label(i))
                            .map(str::to_string),
                        anchor_item: anchor.map(|(id, _)| id),
                        similarity: score,
                    });
                }

                Some(candidate)
            })
            .collect();

        sort_candidates(&mut candidates);

        info!(
            user_id,
            liked = liked.len(),
            candidates = candidates.len(),
            "Content recall completed"
        );

        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserPreferences;
    use crate::services::recall::fixtures;

    fn strategy() -> ContentStrategy {
        ContentStrategy::from_options(&RecommendOptions::default())
    }

    #[test]
    fn test_profile_similarity_ranking() {
        let snapshot = fixtures::snapshot();
        let prefs = UserPreferences::new();
        let ctx = StrategyContext::new(&snapshot, &prefs);

        let candidates = strategy().score(&ctx, 1);
        let ids: Vec<_> = candidates.iter().map(|c| c.item_id).collect();

        // Gatsby shares drama/classic/love with the liked books; the rest share nothing
        assert_eq!(ids, vec![4, 5, 6]);
        assert!(candidates[0].raw_score > 0.8);
        assert_eq!(candidates[1].raw_score, 0.0);
        assert!(candidates[1].evidence.is_empty());

        match &candidates[0].evidence[0] {
            Evidence::FeatureOverlap {
                feature,
                anchor_item,
                ..
            } => {
                assert_eq!(feature.as_deref(), Some("tags=classic"));
                assert_eq!(*anchor_item, Some(2));
            }
            other => panic!("unexpected evidence {:?}", other),
        }
    }

    #[test]
    fn test_no_liked_items_is_empty() {
        let snapshot = fixtures::snapshot();
        let prefs = UserPreferences::new();
        let ctx = StrategyContext::new(&snapshot, &prefs);

        // user 3 liked 1984 and The Hobbit, user 99 rated nothing
        assert!(!strategy().score(&ctx, 3).is_empty());
        assert!(strategy().score(&ctx, 99).is_empty());
    }

    #[test]
    fn test_excludes_rated_items() {
        let snapshot = fixtures::snapshot();
        let prefs = UserPreferences::new();
        let ctx = StrategyContext::new(&snapshot, &prefs);

        for candidate in strategy().score(&ctx, 2) {
            assert!(!snapshot.matrix.has_rated(2, candidate.item_id));
        }
    }
}
