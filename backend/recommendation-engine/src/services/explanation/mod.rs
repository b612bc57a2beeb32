// ============================================
// Explanation Generator (推薦理由)
// ============================================
//
// Turns a candidate's source and evidence into a structured rationale.
// Never fails: missing evidence falls back to a generic popularity text.

use crate::models::{Candidate, CandidateSource, Evidence, EvidenceType, Explanation, ItemId};
use crate::services::snapshot::Snapshot;

const GENERIC_TEXT: &str = "Recommended by popularity";

#[derive(Debug, Clone, Copy, Default)]
pub struct ExplanationGenerator;

impl ExplanationGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn explain(&self, candidate: &Candidate, snapshot: &Snapshot) -> Explanation {
        let neighbor = candidate
            .evidence
            .iter()
            .find(|e| matches!(e, Evidence::Neighbor { .. }));
        let overlap = candidate
            .evidence
            .iter()
            .find(|e| matches!(e, Evidence::FeatureOverlap { .. }));
        let category = candidate
            .evidence
            .iter()
            .find(|e| matches!(e, Evidence::CategoryMatch { .. }));
        let popularity = candidate
            .evidence
            .iter()
            .find(|e| matches!(e, Evidence::Popularity { .. }));

        let explanation = match candidate.source {
            CandidateSource::Collaborative => neighbor.map(|e| self.from_neighbor(candidate.source, e)),
            CandidateSource::Content => overlap.and_then(|e| self.from_overlap(candidate.source, e, snapshot)),
            CandidateSource::Hybrid => match (neighbor, overlap) {
                (Some(n), Some(o)) => Some(self.combined(n, o, snapshot)),
                (Some(n), None) => Some(self.from_neighbor(candidate.source, n)),
                (None, Some(o)) => self.from_overlap(candidate.source, o, snapshot),
                (None, None) => None,
            },
            CandidateSource::ColdStart => category
                .or(popularity)
                .map(|e| self.from_prior(candidate.source, e)),
        };

        explanation.unwrap_or_else(|| Self::generic(candidate.source))
    }

    /// Fallback used when nothing reconstructible supports an item.
    pub fn generic(strategy: CandidateSource) -> Explanation {
        Explanation {
            strategy,
            evidence_type: EvidenceType::Generic,
            evidence_ref: None,
            human_text: GENERIC_TEXT.to_string(),
        }
    }

    fn from_neighbor(&self, strategy: CandidateSource, evidence: &Evidence) -> Explanation {
        let (user_id, rating) = match evidence {
            Evidence::Neighbor {
                user_id, rating, ..
            } => (*user_id, *rating),
            _ => return Self::generic(strategy),
        };

        Explanation {
            strategy,
            evidence_type: EvidenceType::Neighbor,
            evidence_ref: Some(format!("user:{}", user_id)),
            human_text: format!("A reader with similar taste rated this {}/5", rating.round()),
        }
    }

    fn from_overlap(
        &self,
        strategy: CandidateSource,
        evidence: &Evidence,
        snapshot: &Snapshot,
    ) -> Option<Explanation> {
        let Evidence::FeatureOverlap {
            feature,
            anchor_item,
            ..
        } = evidence
        else {
            return None;
        };

        let (evidence_ref, human_text) = match (anchor_item, feature) {
            (Some(anchor), _) => (
                format!("item:{}", anchor),
                format!("Similar to {}, which you liked", self.item_name(*anchor, snapshot)),
            ),
            (None, Some(feature)) => (
                format!("feature:{}", feature),
                format!("Matches your interest in {}", describe_feature(feature)),
            ),
            (None, None) => return None,
        };

        Some(Explanation {
            strategy,
            evidence_type: EvidenceType::FeatureOverlap,
            evidence_ref: Some(evidence_ref),
            human_text,
        })
    }

    fn combined(&self, neighbor: &Evidence, overlap: &Evidence, snapshot: &Snapshot) -> Explanation {
        let user_ref = match neighbor {
            Evidence::Neighbor { user_id, .. } => format!("user:{}", user_id),
            _ => String::new(),
        };
        let (item_ref, similar_to) = match overlap {
            Evidence::FeatureOverlap {
                anchor_item: Some(anchor),
                ..
            } => (
                format!("item:{}", anchor),
                format!("similar to {}", self.item_name(*anchor, snapshot)),
            ),
            Evidence::FeatureOverlap {
                feature: Some(feature),
                ..
            } => (
                format!("feature:{}", feature),
                format!("matches your interest in {}", describe_feature(feature)),
            ),
            _ => (String::new(), "close to what you like".to_string()),
        };

        let evidence_ref = [user_ref, item_ref]
            .into_iter()
            .filter(|r| !r.is_empty())
            .collect::<Vec<_>>()
            .join(",");

        Explanation {
            strategy: CandidateSource::Hybrid,
            evidence_type: EvidenceType::NeighborAndFeature,
            evidence_ref: Some(evidence_ref),
            human_text: format!("Liked by readers with similar taste and {}", similar_to),
        }
    }

    fn from_prior(&self, strategy: CandidateSource, evidence: &Evidence) -> Explanation {
        match evidence {
            Evidence::CategoryMatch { category } => Explanation {
                strategy,
                evidence_type: EvidenceType::CategoryMatch,
                evidence_ref: Some(format!("category:{}", category)),
                human_text: format!("Popular in {}, a category you follow", category),
            },
            Evidence::Popularity { popularity } => Explanation {
                strategy,
                evidence_type: EvidenceType::Popularity,
                evidence_ref: None,
                human_text: format!("Popular with readers (rated {:.1})", popularity),
            },
            _ => Self::generic(strategy),
        }
    }

    fn item_name(&self, item_id: ItemId, snapshot: &Snapshot) -> String {
        snapshot
            .item(item_id)
            .map(|item| item.display_name())
            .unwrap_or_else(|| format!("Item {}", item_id))
    }
}

/// `genre=fantasy` → `genre: fantasy`
fn describe_feature(label: &str) -> String {
    match label.split_once('=') {
        Some((key, value)) => format!("{}: {}", key, value),
        None => label.to_string(),
    }
}
