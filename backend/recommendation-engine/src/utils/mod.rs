// Utility functions for recommendation-engine

use crate::models::Candidate;
use std::cmp::Ordering;

/// Normalize a score to [0, 1] range.
/// A degenerate range (all scores equal) maps to 1.0.
pub fn normalize_score(score: f64, min: f64, max: f64) -> f64 {
    if max - min < f64::EPSILON {
        1.0
    } else {
        ((score - min) / (max - min)).clamp(0.0, 1.0)
    }
}

/// Min-max bounds of the candidate scores, None for an empty slice
pub fn score_bounds(candidates: &[Candidate]) -> Option<(f64, f64)> {
    candidates.iter().map(|c| c.raw_score).fold(None, |acc, s| match acc {
        None => Some((s, s)),
        Some((lo, hi)) => Some((lo.min(s), hi.max(s))),
    })
}

/// Score descending, id ascending. NaN sorts last.
pub fn by_score_desc<K: Ord>(a: (f64, K), b: (f64, K)) -> Ordering {
    match (a.0.is_nan(), b.0.is_nan()) {
        (true, true) => a.1.cmp(&b.1),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b
            .0
            .partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1)),
    }
}

/// Sort candidates by raw score (descending), ties by ItemId (ascending)
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| by_score_desc((a.raw_score, a.item_id), (b.raw_score, b.item_id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandidateSource;

    #[test]
    fn test_normalize_score() {
        assert!((normalize_score(5.0, 0.0, 10.0) - 0.5).abs() < 0.001);
        assert!((normalize_score(10.0, 0.0, 10.0) - 1.0).abs() < 0.001);
        assert!((normalize_score(0.0, 0.0, 10.0) - 0.0).abs() < 0.001);
        assert_eq!(normalize_score(3.0, 3.0, 3.0), 1.0);
    }

    #[test]
    fn test_sort_candidates_tie_break() {
        let mut candidates = vec![
            Candidate::new(9, 0.5, CandidateSource::Content),
            Candidate::new(3, 0.9, CandidateSource::Content),
            Candidate::new(2, 0.5, CandidateSource::Content),
            Candidate::new(4, f64::NAN, CandidateSource::Content),
        ];
        sort_candidates(&mut candidates);

        let ids: Vec<_> = candidates.iter().map(|c| c.item_id).collect();
        assert_eq!(ids, vec![3, 2, 9, 4]);
    }

    #[test]
    fn test_score_bounds() {
        assert_eq!(score_bounds(&[]), None);
        let candidates = vec![
            Candidate::new(1, 0.2, CandidateSource::Hybrid),
            Candidate::new(2, 0.8, CandidateSource::Hybrid),
        ];
        assert_eq!(score_bounds(&candidates), Some((0.2, 0.8)));
    }
}
