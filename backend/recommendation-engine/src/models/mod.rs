use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Alias for user identifiers supplied by the catalog owner.
pub type UserId = u64;
/// Alias for item identifiers supplied by the catalog owner.
pub type ItemId = u64;

/// Valid rating range (inclusive).
pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

/// A single explicit rating, as handed over by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub value: i32,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl RatingRecord {
    pub fn new(user_id: UserId, item_id: ItemId, value: i32) -> Self {
        Self {
            user_id,
            item_id,
            value,
            timestamp: Utc::now(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Attribute value on an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Text(value.to_string())
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Number(value)
    }
}

impl From<bool> for FeatureValue {
    fn from(value: bool) -> Self {
        FeatureValue::Bool(value)
    }
}

impl From<Vec<&str>> for FeatureValue {
    fn from(values: Vec<&str>) -> Self {
        FeatureValue::List(values.into_iter().map(str::to_string).collect())
    }
}

fn default_active() -> bool {
    true
}

/// Catalog entry. Immutable for the duration of one computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item_id: ItemId,
    #[serde(default)]
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub features: BTreeMap<String, FeatureValue>,
    #[serde(default)]
    pub popularity: f64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl ItemRecord {
    pub fn new(item_id: ItemId, name: &str, category: &str, popularity: f64) -> Self {
        Self {
            item_id,
            name: name.to_string(),
            category: category.to_string(),
            features: BTreeMap::new(),
            popularity,
            is_active: true,
        }
    }

    pub fn with_feature(mut self, key: &str, value: impl Into<FeatureValue>) -> Self {
        self.features.insert(key.to_string(), value.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Display name, falling back to the id when the catalog left it blank
    pub fn display_name(&self) -> String {
        if self.name.trim().is_empty() {
            format!("Item {}", self.item_id)
        } else {
            self.name.clone()
        }
    }
}

/// Preference keys that carry category choices.
const CATEGORY_PREFERENCE_KEYS: [&str; 4] = [
    "category",
    "categories",
    "preferred_categories",
    "favorite_categories",
];

/// Declared user preferences (key -> value), as stored on the user profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserPreferences {
    pub values: BTreeMap<String, String>,
}

impl UserPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    /// Lower-cased category names the user declared interest in.
    pub fn preferred_categories(&self) -> BTreeSet<String> {
        CATEGORY_PREFERENCE_KEYS
            .iter()
            .filter_map(|key| self.values.get(*key))
            .flat_map(|value| value.split(','))
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Collaborative, // 相似用戶評分
    Content,       // 內容特徵相似
    Hybrid,        // 混合
    ColdStart,     // 熱門 / 類別先驗
}

impl CandidateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateSource::Collaborative => "collaborative",
            CandidateSource::Content => "content",
            CandidateSource::Hybrid => "hybrid",
            CandidateSource::ColdStart => "coldstart",
        }
    }
}

/// What supported a candidate's score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Evidence {
    Neighbor {
        user_id: UserId,
        similarity: f64,
        rating: f64,
    },
    FeatureOverlap {
        feature: Option<String>,
        anchor_item: Option<ItemId>,
        similarity: f64,
    },
    Popularity {
        popularity: f64,
    },
    CategoryMatch {
        category: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub item_id: ItemId,
    pub raw_score: f64,
    pub source: CandidateSource,
    pub evidence: Vec<Evidence>,
}

impl Candidate {
    pub fn new(item_id: ItemId, raw_score: f64, source: CandidateSource) -> Self {
        Self {
            item_id,
            raw_score,
            source,
            evidence: Vec::new(),
        }
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence.push(evidence);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    Neighbor,
    FeatureOverlap,
    NeighborAndFeature,
    CategoryMatch,
    Popularity,
    Generic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub strategy: CandidateSource,
    pub evidence_type: EvidenceType,
    pub evidence_ref: Option<String>,
    pub human_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub item_id: ItemId,
    pub final_score: f64,
    pub rank: usize,
    pub source: CandidateSource,
    pub explanation: Explanation,
}

/// Item returned by the similar-items lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarItem {
    pub item_id: ItemId,
    pub name: String,
    pub category: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecommendStats {
    pub primary_count: usize,
    pub cold_start_count: usize,
    pub final_count: usize,
    pub diversified: bool,
}
