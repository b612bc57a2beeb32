// ============================================
// Feature Vectorizer (物品特徵向量)
// ============================================
//
// Builds a fixed-length numeric vector per item from its attribute map.
//
// Schema: union of attribute keys, ordered by first appearance while
// scanning items in input order. A key's kind is fixed by its first value:
// - number  → 1 dim, min-max normalized over the catalog
// - boolean → 1 dim (1.0 / 0.0)
// - text    → one-hot over distinct values
// - list    → multi-hot over distinct values
//
// Missing or mistyped attributes contribute zero, never an error.

use crate::error::{IngestReport, RecordKind, RejectedRecord, ValidationError};
use crate::models::{FeatureValue, ItemId, ItemRecord};
use crate::services::matrix::SparseVector;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Numeric,
    Boolean,
    Categorical,
    MultiCategorical,
}

impl AttributeKind {
    fn of(value: &FeatureValue) -> Self {
        match value {
            FeatureValue::Number(_) => AttributeKind::Numeric,
            FeatureValue::Bool(_) => AttributeKind::Boolean,
            FeatureValue::Text(_) => AttributeKind::Categorical,
            FeatureValue::List(_) => AttributeKind::MultiCategorical,
        }
    }
}

#[derive(Debug, Clone)]
struct Attribute {
    key: String,
    kind: AttributeKind,
    /// Offset of the attribute's first dimension
    offset: usize,
    /// Distinct values for (multi-)categorical attributes, first-seen order
    values: Vec<String>,
    value_index: HashMap<String, usize>,
    min: f64,
    max: f64,
}

impl Attribute {
    fn width(&self) -> usize {
        match self.kind {
            AttributeKind::Numeric | AttributeKind::Boolean => 1,
            AttributeKind::Categorical | AttributeKind::MultiCategorical => self.values.len(),
        }
    }

    fn observe_value(&mut self, value: &str) {
        if !self.value_index.contains_key(value) {
            self.value_index.insert(value.to_string(), self.values.len());
            self.values.push(value.to_string());
        }
    }
}

/// Shared attribute schema; all vectors built against it have equal length.
#[derive(Debug, Clone, Default)]
pub struct FeatureSchema {
    attributes: Vec<Attribute>,
    labels: Vec<String>,
}

impl FeatureSchema {
    fn from_items(items: &[&ItemRecord]) -> Self {
        let mut attributes: Vec<Attribute> = Vec::new();
        let mut by_key: HashMap<String, usize> = HashMap::new();

        for item in items {
            for (key, value) in &item.features {
                let idx = *by_key.entry(key.clone()).or_insert_with(|| {
                    attributes.push(Attribute {
                        key: key.clone(),
                        kind: AttributeKind::of(value),
                        offset: 0,
                        values: Vec::new(),
                        value_index: HashMap::new(),
                        min: f64::INFINITY,
                        max: f64::NEG_INFINITY,
                    });
                    attributes.len() - 1
                });

                let attribute = &mut attributes[idx];
                match (attribute.kind, value) {
                    (AttributeKind::Numeric, FeatureValue::Number(n)) if n.is_finite() => {
                        attribute.min = attribute.min.min(*n);
                        attribute.max = attribute.max.max(*n);
                    }
                    (AttributeKind::Categorical, FeatureValue::Text(s)) => {
                        attribute.observe_value(s);
                    }
                    (AttributeKind::MultiCategorical, FeatureValue::List(values)) => {
                        for v in values {
                            attribute.observe_value(v);
                        }
                    }
                    (AttributeKind::Boolean, FeatureValue::Bool(_)) => {}
                    (kind, _) => {
                        debug!(
                            item_id = item.item_id,
                            key = %key,
                            expected = ?kind,
                            "Attribute type mismatch, encoding as zero"
                        );
                    }
                }
            }
        }

        let mut offset = 0;
        let mut labels = Vec::new();
        for attribute in &mut attributes {
            attribute.offset = offset;
            offset += attribute.width();
            match attribute.kind {
                AttributeKind::Numeric | AttributeKind::Boolean => {
                    labels.push(attribute.key.clone())
                }
                AttributeKind::Categorical | AttributeKind::MultiCategorical => labels.extend(
                    attribute
                        .values
                        .iter()
                        .map(|v| format!("{}={}", attribute.key, v)),
                ),
            }
        }

        Self { attributes, labels }
    }

    pub fn dimensions(&self) -> usize {
        self.labels.len()
    }

    /// Human-readable label of a dimension (`key` or `key=value`)
    pub fn label(&self, dimension: usize) -> Option<&str> {
        self.labels.get(dimension).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.key.as_str())
    }

    /// Encode one attribute map against this schema.
    pub fn encode(&self, features: &BTreeMap<String, FeatureValue>) -> FeatureVector {
        let mut values = vec![0.0; self.dimensions()];

        for attribute in &self.attributes {
            let Some(value) = features.get(&attribute.key) else {
                continue;
            };
            match (attribute.kind, value) {
                (AttributeKind::Numeric, FeatureValue::Number(n)) if n.is_finite() => {
                    let range = attribute.max - attribute.min;
                    values[attribute.offset] = if range <= f64::EPSILON {
                        1.0
                    } else {
                        ((n - attribute.min) / range).clamp(0.0, 1.0)
                    };
                }
                (AttributeKind::Boolean, FeatureValue::Bool(b)) => {
                    values[attribute.offset] = if *b { 1.0 } else { 0.0 };
                }
                (AttributeKind::Categorical, FeatureValue::Text(s)) => {
                    if let Some(i) = attribute.value_index.get(s) {
                        values[attribute.offset + i] = 1.0;
                    }
                }
                (AttributeKind::MultiCategorical, FeatureValue::List(list)) => {
                    for v in list {
                        if let Some(i) = attribute.value_index.get(v) {
                            values[attribute.offset + i] = 1.0;
                        }
                    }
                }
                _ => {}
            }
        }

        FeatureVector { values }
    }
}

/// Dense per-item feature vector.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureVector {
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }

    /// Nonzero entries keyed by dimension index
    pub fn to_sparse(&self) -> SparseVector {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0.0)
            .map(|(i, v)| (i as u64, *v))
            .collect()
    }
}

/// Validated catalog plus one feature vector per valid item.
#[derive(Debug, Clone, Default)]
pub struct ItemFeatures {
    pub schema: FeatureSchema,
    vectors: BTreeMap<ItemId, FeatureVector>,
}

impl ItemFeatures {
    pub fn vector(&self, item_id: ItemId) -> Option<&FeatureVector> {
        self.vectors.get(&item_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &FeatureVector)> {
        self.vectors.iter().map(|(id, v)| (*id, v))
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// Builds item feature vectors from a catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureVectorizer;

impl FeatureVectorizer {
    pub fn new() -> Self {
        Self
    }

    /// Validate an item record
    pub fn validate(item: &ItemRecord) -> Result<(), ValidationError> {
        if item.category.trim().is_empty() {
            return Err(ValidationError::BlankCategory {
                item_id: item.item_id,
            });
        }
        if !item.popularity.is_finite() || item.popularity < 0.0 {
            return Err(ValidationError::InvalidPopularity {
                item_id: item.item_id,
                value: item.popularity,
            });
        }
        Ok(())
    }

    /// Validate items and return the accepted ones (first occurrence of an id wins).
    pub fn accept<'a>(&self, items: &'a [ItemRecord]) -> (Vec<&'a ItemRecord>, Vec<RejectedRecord>) {
        let mut seen: HashSet<ItemId> = HashSet::new();
        let mut accepted = Vec::with_capacity(items.len());
        let mut rejected = Vec::new();

        for (index, item) in items.iter().enumerate() {
            let verdict = Self::validate(item).and_then(|_| {
                if seen.insert(item.item_id) {
                    Ok(())
                } else {
                    Err(ValidationError::DuplicateItem {
                        item_id: item.item_id,
                    })
                }
            });

            match verdict {
                Ok(()) => accepted.push(item),
                Err(error) => {
                    warn!(index, item_id = item.item_id, error = %error, "Rejected item record");
                    rejected.push(RejectedRecord {
                        index,
                        kind: RecordKind::Item,
                        error,
                    });
                }
            }
        }

        (accepted, rejected)
    }

    /// Build schema and vectors from scratch. Idempotent for identical input.
    pub fn build(&self, items: &[ItemRecord]) -> IngestReport<ItemFeatures> {
        let (accepted, rejected) = self.accept(items);
        IngestReport {
            value: self.vectorize(&accepted),
            rejected,
        }
    }

    /// Encode already validated items.
    pub fn vectorize(&self, items: &[&ItemRecord]) -> ItemFeatures {
        let schema = FeatureSchema::from_items(items);

        let vectors = items
            .iter()
            .map(|item| (item.item_id, schema.encode(&item.features)))
            .collect::<BTreeMap<_, _>>();

        debug!(
            items = vectors.len(),
            dimensions = schema.dimensions(),
            "Feature vectors built"
        );

        ItemFeatures { schema, vectors }
    }
}
