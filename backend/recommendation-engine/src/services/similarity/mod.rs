// ============================================
// Similarity Engine (相似度計算)
// ============================================
//
// Pairwise similarity over sparse vectors:
// - Cosine:  dot / (|A| |B|), clamped to [-1, 1]
// - Pearson: correlation over co-present dimensions only
// - Jaccard: |nonzero ∩| / |nonzero ∪|
//
// Neighbor search covers users (rating rows), items (rating columns)
// and item feature vectors. User-pair similarities are memoized per
// snapshot in a concurrent map.

use crate::models::{ItemId, UserId};
use crate::services::features::ItemFeatures;
use crate::services::matrix::{InteractionMatrix, SparseVector};
use crate::utils::by_score_desc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    Cosine,
    #[default]
    Pearson,
    Jaccard,
}

impl SimilarityMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMetric::Cosine => "cosine",
            SimilarityMetric::Pearson => "pearson",
            SimilarityMetric::Jaccard => "jaccard",
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimilarityMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(SimilarityMetric::Cosine),
            "pearson" => Ok(SimilarityMetric::Pearson),
            "jaccard" => Ok(SimilarityMetric::Jaccard),
            other => Err(format!("unknown similarity metric '{}'", other)),
        }
    }
}

/// Similarity between two sparse vectors. Exactly symmetric.
pub fn similarity(a: &SparseVector, b: &SparseVector, metric: SimilarityMetric) -> f64 {
    match metric {
        SimilarityMetric::Cosine => cosine(a, b),
        SimilarityMetric::Pearson => pearson(a, b),
        SimilarityMetric::Jaccard => jaccard(a, b),
    }
}

/// Cosine similarity of two dense vectors of equal length.
pub fn dense_cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

fn cosine(a: &SparseVector, b: &SparseVector) -> f64 {
    let norm_a = a.values().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.values().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    // Intersection visited in key order whichever side drives, so a·b == b·a
    let dot: f64 = a
        .iter()
        .filter_map(|(k, x)| b.get(k).map(|y| x * y))
        .sum();

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

fn pearson(a: &SparseVector, b: &SparseVector) -> f64 {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .filter_map(|(k, x)| b.get(k).map(|y| (*x, *y)))
        .collect();

    if pairs.len() < 2 {
        return 0.0;
    }

    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in &pairs {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    if var_a <= f64::EPSILON || var_b <= f64::EPSILON {
        return 0.0;
    }

    (cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0)
}

fn jaccard(a: &SparseVector, b: &SparseVector) -> f64 {
    let nonzero_a = a.values().filter(|v| **v != 0.0).count();
    let nonzero_b = b.values().filter(|v| **v != 0.0).count();
    let intersection = a
        .iter()
        .filter(|(k, v)| **v != 0.0 && b.get(k).is_some_and(|y| *y != 0.0))
        .count();
    let union = nonzero_a + nonzero_b - intersection;

    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// What to find neighbors for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    /// Users, compared by rating rows
    User(UserId),
    /// Items, compared by rating columns
    Item(ItemId),
    /// Items, compared by feature vectors
    Features(ItemId),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub id: u64,
    pub score: f64,
}

/// Memoized user-pair similarities, keyed by (metric, low id, high id).
#[derive(Debug, Default)]
pub struct SimilarityCache {
    pairs: DashMap<(SimilarityMetric, UserId, UserId), f64>,
}

impl SimilarityCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(metric: SimilarityMetric, a: UserId, b: UserId) -> (SimilarityMetric, UserId, UserId) {
        if a <= b {
            (metric, a, b)
        } else {
            (metric, b, a)
        }
    }

    pub fn get_or_compute(
        &self,
        metric: SimilarityMetric,
        a: UserId,
        b: UserId,
        compute: impl FnOnce() -> f64,
    ) -> f64 {
        *self
            .pairs
            .entry(Self::key(metric, a, b))
            .or_insert_with(compute)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Neighbor search over one snapshot's matrix and feature vectors.
pub struct SimilarityEngine<'a> {
    matrix: &'a InteractionMatrix,
    features: &'a ItemFeatures,
    cache: &'a SimilarityCache,
}

impl<'a> SimilarityEngine<'a> {
    pub fn new(
        matrix: &'a InteractionMatrix,
        features: &'a ItemFeatures,
        cache: &'a SimilarityCache,
    ) -> Self {
        Self {
            matrix,
            features,
            cache,
        }
    }

    /// Memoized similarity between two users' rating rows.
    pub fn user_similarity(&self, a: UserId, b: UserId, metric: SimilarityMetric) -> f64 {
        self.cache.get_or_compute(metric, a, b, || {
            similarity(self.matrix.row(a), self.matrix.row(b), metric)
        })
    }

    /// Similarity between two items' feature vectors; 0 when either is missing.
    pub fn feature_similarity(&self, a: ItemId, b: ItemId, metric: SimilarityMetric) -> f64 {
        match (self.features.vector(a), self.features.vector(b)) {
            (Some(va), Some(vb)) => similarity(&va.to_sparse(), &vb.to_sparse(), metric),
            _ => 0.0,
        }
    }

    /// Top-k neighbors of the target, score descending then id ascending.
    /// The target itself is never included.
    pub fn neighbors(&self, target: Entity, k: usize, metric: SimilarityMetric) -> Vec<Neighbor> {
        if k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<Neighbor> = match target {
            Entity::User(user_id) => self
                .matrix
                .users()
                .filter(|other| *other != user_id)
                .map(|other| Neighbor {
                    id: other,
                    score: self.user_similarity(user_id, other, metric),
                })
                .collect(),
            Entity::Item(item_id) => {
                let column = self.matrix.column(item_id);
                self.matrix
                    .items()
                    .filter(|other| *other != item_id)
                    .map(|other| Neighbor {
                        id: other,
                        score: similarity(column, self.matrix.column(other), metric),
                    })
                    .collect()
            }
            Entity::Features(item_id) => {
                let Some(vector) = self.features.vector(item_id) else {
                    return Vec::new();
                };
                let target = vector.to_sparse();
                self.features
                    .iter()
                    .filter(|(other, _)| *other != item_id)
                    .map(|(other, v)| Neighbor {
                        id: other,
                        score: similarity(&target, &v.to_sparse(), metric),
                    })
                    .collect()
            }
        };

        scored.sort_by(|a, b| by_score_desc((a.score, a.id), (b.score, b.id)));
        scored.truncate(k);
        scored
    }

    /// Top-k users with positive similarity and at least `min_co_rated` co-rated items.
    pub fn user_neighbors(
        &self,
        user_id: UserId,
        k: usize,
        metric: SimilarityMetric,
        min_co_rated: usize,
    ) -> Vec<Neighbor> {
        if k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<Neighbor> = self
            .matrix
            .users()
            .filter(|other| *other != user_id)
            .filter(|other| self.matrix.co_rated_count(user_id, *other) >= min_co_rated)
            .map(|other| Neighbor {
                id: other,
                score: self.user_similarity(user_id, other, metric),
            })
            .filter(|n| n.score > 0.0)
            .collect();

        scored.sort_by(|a, b| by_score_desc((a.score, a.id), (b.score, b.id)));
        scored.truncate(k);

        debug!(
            user_id,
            metric = %metric,
            neighbors = scored.len(),
            memoized = self.cache.len(),
            "User neighbors computed"
        );

        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemRecord, RatingRecord};
    use crate::services::features::FeatureVectorizer;

    fn vector(entries: &[(u64, f64)]) -> SparseVector {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let a = vector(&[(1, 5.0), (2, 3.0), (3, 4.0), (7, 1.0)]);
        let b = vector(&[(1, 4.0), (2, 1.0), (3, 5.0), (9, 2.0)]);

        for metric in [
            SimilarityMetric::Cosine,
            SimilarityMetric::Pearson,
            SimilarityMetric::Jaccard,
        ] {
            assert_eq!(similarity(&a, &b, metric), similarity(&b, &a, metric));
        }
    }

    #[test]
    fn test_self_cosine_is_one() {
        let a = vector(&[(1, 0.3), (4, 2.0), (5, 1.7)]);
        assert!((similarity(&a, &a, SimilarityMetric::Cosine) - 1.0).abs() < 1e-9);
        assert!((dense_cosine(&[0.3, 2.0, 1.7], &[0.3, 2.0, 1.7]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_inputs_are_zero() {
        let empty = SparseVector::new();
        let a = vector(&[(1, 5.0), (2, 3.0)]);
        assert_eq!(similarity(&empty, &a, SimilarityMetric::Cosine), 0.0);
        assert_eq!(similarity(&empty, &empty, SimilarityMetric::Jaccard), 0.0);

        // one co-present dimension
        let b = vector(&[(1, 4.0), (3, 2.0)]);
        assert_eq!(similarity(&a, &b, SimilarityMetric::Pearson), 0.0);

        // constant ratings have no variance
        let flat = vector(&[(1, 3.0), (2, 3.0)]);
        assert_eq!(similarity(&a, &flat, SimilarityMetric::Pearson), 0.0);
    }

    #[test]
    fn test_pearson_identical_raters() {
        let a = vector(&[(10, 5.0), (11, 3.0), (12, 1.0)]);
        let b = a.clone();
        assert!((similarity(&a, &b, SimilarityMetric::Pearson) - 1.0).abs() < 1e-9);

        let inverse = vector(&[(10, 1.0), (11, 3.0), (12, 5.0)]);
        assert!((similarity(&a, &inverse, SimilarityMetric::Pearson) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_jaccard_overlap() {
        let a = vector(&[(1, 1.0), (2, 1.0), (3, 1.0)]);
        let b = vector(&[(2, 1.0), (3, 1.0), (4, 1.0)]);
        assert!((similarity(&a, &b, SimilarityMetric::Jaccard) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!("Cosine".parse::<SimilarityMetric>(), Ok(SimilarityMetric::Cosine));
        assert!("euclid".parse::<SimilarityMetric>().is_err());
        let metric: SimilarityMetric = serde_json::from_str("\"jaccard\"").unwrap();
        assert_eq!(metric, SimilarityMetric::Jaccard);
    }

    fn matrix() -> InteractionMatrix {
        InteractionMatrix::build(&[
            RatingRecord::new(1, 10, 5),
            RatingRecord::new(1, 11, 3),
            RatingRecord::new(1, 12, 1),
            RatingRecord::new(2, 10, 5),
            RatingRecord::new(2, 11, 3),
            RatingRecord::new(2, 12, 1),
            RatingRecord::new(3, 10, 1),
            RatingRecord::new(3, 11, 3),
            RatingRecord::new(3, 12, 5),
            RatingRecord::new(4, 10, 4),
        ])
        .value
    }

    #[test]
    fn test_user_neighbors_mutual_and_filtered() {
        let matrix = matrix();
        let features = ItemFeatures::default();
        let cache = SimilarityCache::new();
        let engine = SimilarityEngine::new(&matrix, &features, &cache);

        let of_one = engine.user_neighbors(1, 5, SimilarityMetric::Pearson, 2);
        let of_two = engine.user_neighbors(2, 5, SimilarityMetric::Pearson, 2);

        // user 3 is negatively correlated, user 4 shares a single item
        assert_eq!(of_one.len(), 1);
        assert_eq!(of_one[0].id, 2);
        assert!((of_one[0].score - 1.0).abs() < 1e-9);
        assert_eq!(of_two[0].id, 1);

        // (1,2) memoized once regardless of direction
        assert!(cache.len() >= 1);
        assert_eq!(
            engine.user_similarity(2, 1, SimilarityMetric::Pearson),
            engine.user_similarity(1, 2, SimilarityMetric::Pearson)
        );
    }

    #[test]
    fn test_neighbors_k_bounds_and_tie_break() {
        let matrix = matrix();
        let features = ItemFeatures::default();
        let cache = SimilarityCache::new();
        let engine = SimilarityEngine::new(&matrix, &features, &cache);

        assert!(engine
            .neighbors(Entity::User(1), 0, SimilarityMetric::Cosine)
            .is_empty());

        let all = engine.neighbors(Entity::User(1), 100, SimilarityMetric::Jaccard);
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|n| n.id != 1));
        // users 2 and 3 tie at 1.0; lower id first
        assert_eq!(all[0].id, 2);
        assert_eq!(all[1].id, 3);
    }

    #[test]
    fn test_feature_neighbors() {
        let items = vec![
            ItemRecord::new(1, "A", "X", 1.0).with_feature("genre", "fantasy"),
            ItemRecord::new(2, "B", "X", 1.0).with_feature("genre", "fantasy"),
            ItemRecord::new(3, "C", "X", 1.0).with_feature("genre", "horror"),
        ];
        let features = FeatureVectorizer::new().build(&items).value;
        let matrix = InteractionMatrix::default();
        let cache = SimilarityCache::new();
        let engine = SimilarityEngine::new(&matrix, &features, &cache);

        let neighbors = engine.neighbors(Entity::Features(1), 2, SimilarityMetric::Cosine);
        assert_eq!(neighbors[0].id, 2);
        assert!((neighbors[0].score - 1.0).abs() < 1e-9);
        assert_eq!(neighbors[1].score, 0.0);

        assert!(engine
            .neighbors(Entity::Features(42), 2, SimilarityMetric::Cosine)
            .is_empty());

        assert!((engine.feature_similarity(1, 2, SimilarityMetric::Cosine) - 1.0).abs() < 1e-9);
        assert_eq!(
            engine.feature_similarity(1, 3, SimilarityMetric::Jaccard),
            engine.feature_similarity(3, 1, SimilarityMetric::Jaccard)
        );
        assert_eq!(engine.feature_similarity(1, 42, SimilarityMetric::Cosine), 0.0);
    }

    #[test]
    fn test_item_neighbors_over_rating_columns() {
        // columns 10, 11, 12 are identical; 13 overlaps on user 1 only; 14 shares no rater
        let matrix = InteractionMatrix::build(&[
            RatingRecord::new(1, 10, 4),
            RatingRecord::new(1, 11, 4),
            RatingRecord::new(1, 12, 4),
            RatingRecord::new(1, 13, 4),
            RatingRecord::new(2, 10, 2),
            RatingRecord::new(2, 11, 2),
            RatingRecord::new(2, 12, 2),
            RatingRecord::new(3, 13, 5),
            RatingRecord::new(3, 14, 5),
        ])
        .value;
        let features = ItemFeatures::default();
        let cache = SimilarityCache::new();
        let engine = SimilarityEngine::new(&matrix, &features, &cache);

        let neighbors = engine.neighbors(Entity::Item(12), 10, SimilarityMetric::Cosine);
        let ids: Vec<_> = neighbors.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![10, 11, 13, 14]);
        assert_eq!(neighbors[0].score, neighbors[1].score);
        assert!((neighbors[0].score - 1.0).abs() < 1e-9);
        assert!(neighbors[2].score > 0.0 && neighbors[2].score < 1.0);
        assert_eq!(neighbors[3].score, 0.0);

        let top = engine.neighbors(Entity::Item(10), 1, SimilarityMetric::Cosine);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].id, 11);
    }
}
