// ============================================
// Data Snapshot (資料快照)
// ============================================
//
// Immutable derived data for one version of ratings + items:
// interaction matrix, feature vectors, validated catalog and the
// user-pair similarity memo. Shared read-only behind Arc; a new
// version is fully built before it is swapped into the cache.

use crate::error::RejectedRecord;
use crate::models::{ItemId, ItemRecord, RatingRecord, UserId, UserPreferences};
use crate::services::features::{FeatureVectorizer, ItemFeatures};
use crate::services::matrix::InteractionMatrix;
use crate::services::similarity::{SimilarityCache, SimilarityEngine};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Supplies raw rows to the engine. Implemented by the persistence layer.
pub trait CatalogSource: Send + Sync {
    fn load_ratings(&self) -> Result<Vec<RatingRecord>>;
    fn load_items(&self) -> Result<Vec<ItemRecord>>;
    fn load_user_preferences(&self, user_id: UserId) -> Result<UserPreferences>;
}

/// CatalogSource over in-memory collections
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    ratings: Vec<RatingRecord>,
    items: Vec<ItemRecord>,
    preferences: HashMap<UserId, UserPreferences>,
}

impl InMemoryCatalog {
    pub fn new(ratings: Vec<RatingRecord>, items: Vec<ItemRecord>) -> Self {
        Self {
            ratings,
            items,
            preferences: HashMap::new(),
        }
    }

    pub fn with_preferences(mut self, user_id: UserId, preferences: UserPreferences) -> Self {
        self.preferences.insert(user_id, preferences);
        self
    }

    pub fn user_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self
            .ratings
            .iter()
            .map(|r| r.user_id)
            .chain(self.preferences.keys().copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

impl CatalogSource for InMemoryCatalog {
    fn load_ratings(&self) -> Result<Vec<RatingRecord>> {
        Ok(self.ratings.clone())
    }

    fn load_items(&self) -> Result<Vec<ItemRecord>> {
        Ok(self.items.clone())
    }

    fn load_user_preferences(&self, user_id: UserId) -> Result<UserPreferences> {
        Ok(self.preferences.get(&user_id).cloned().unwrap_or_default())
    }
}

/// Content fingerprint of the raw rows; equal rows give equal fingerprints.
pub fn fingerprint(ratings: &[RatingRecord], items: &[ItemRecord]) -> u64 {
    let mut hasher = DefaultHasher::new();

    ratings.len().hash(&mut hasher);
    for r in ratings {
        r.user_id.hash(&mut hasher);
        r.item_id.hash(&mut hasher);
        r.value.hash(&mut hasher);
        r.timestamp.timestamp_micros().hash(&mut hasher);
    }

    items.len().hash(&mut hasher);
    for item in items {
        item.item_id.hash(&mut hasher);
        item.name.hash(&mut hasher);
        item.category.hash(&mut hasher);
        item.popularity.to_bits().hash(&mut hasher);
        item.is_active.hash(&mut hasher);
        serde_json::to_string(&item.features)
            .unwrap_or_default()
            .hash(&mut hasher);
    }

    hasher.finish()
}

#[derive(Debug)]
pub struct Snapshot {
    pub version: u64,
    pub built_at: DateTime<Utc>,
    pub matrix: InteractionMatrix,
    pub features: ItemFeatures,
    catalog: BTreeMap<ItemId, ItemRecord>,
    similarity_cache: SimilarityCache,
    /// Input rows rejected while building
    pub diagnostics: Vec<RejectedRecord>,
}

impl Snapshot {
    pub fn build(ratings: &[RatingRecord], items: &[ItemRecord]) -> Self {
        let version = fingerprint(ratings, items);
        let matrix_report = InteractionMatrix::build(ratings);

        let vectorizer = FeatureVectorizer::new();
        let (accepted, rejected_items) = vectorizer.accept(items);
        let features = vectorizer.vectorize(&accepted);
        let catalog = accepted
            .into_iter()
            .map(|item| (item.item_id, item.clone()))
            .collect::<BTreeMap<_, _>>();

        let mut diagnostics = matrix_report.rejected;
        diagnostics.extend(rejected_items);

        info!(
            version,
            users = matrix_report.value.num_users(),
            items = catalog.len(),
            ratings = matrix_report.value.len(),
            rejected = diagnostics.len(),
            "Snapshot built"
        );

        Self {
            version,
            built_at: Utc::now(),
            matrix: matrix_report.value,
            features,
            catalog,
            similarity_cache: SimilarityCache::new(),
            diagnostics,
        }
    }

    pub fn similarity(&self) -> SimilarityEngine<'_> {
        SimilarityEngine::new(&self.matrix, &self.features, &self.similarity_cache)
    }

    pub fn similarity_cache(&self) -> &SimilarityCache {
        &self.similarity_cache
    }

    pub fn item(&self, item_id: ItemId) -> Option<&ItemRecord> {
        self.catalog.get(&item_id)
    }

    pub fn is_active(&self, item_id: ItemId) -> bool {
        self.item(item_id).is_some_and(|item| item.is_active)
    }

    /// Active catalog items in ItemId order
    pub fn active_items(&self) -> impl Iterator<Item = &ItemRecord> {
        self.catalog.values().filter(|item| item.is_active)
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemRecord> {
        self.catalog.values()
    }

    pub fn has_active_items(&self) -> bool {
        self.active_items().next().is_some()
    }
}

/// Holds the latest snapshot; older versions are dropped on swap.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Return the cached snapshot for these rows, building it on a fingerprint miss.
    pub fn get_or_build(&self, ratings: &[RatingRecord], items: &[ItemRecord]) -> Arc<Snapshot> {
        let version = fingerprint(ratings, items);

        if let Some(snapshot) = self.current().filter(|s| s.version == version) {
            debug!(version, "Snapshot cache hit");
            return snapshot;
        }

        debug!(version, "Snapshot cache miss");
        let snapshot = Arc::new(Snapshot::build(ratings, items));

        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Another request may have built the same version meanwhile
        if let Some(existing) = current.as_ref().filter(|s| s.version == version) {
            return Arc::clone(existing);
        }
        *current = Some(Arc::clone(&snapshot));
        snapshot
    }

    pub fn invalidate(&self) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if current.take().is_some() {
            info!("Snapshot cache invalidated");
        }
    }
}
