// ============================================
// Recommendation Engine (推薦編排)
// ============================================
//
// Pipeline per request:
// 1. Validate options, resolve strategy by name
// 2. Current snapshot (cached) + user preferences
// 3. Strategy scoring, result filters
// 4. Cold-start merge when results are thin
// 5. Truncate to top_n
// 6. Diversity re-ranking (lambda > 0)
// 7. Explanations, dense ranks
// 8. Notify event sinks

use crate::config::{EngineConfig, RecommendOptions};
use crate::error::{RecommendError, Result};
use crate::models::{
    Candidate, Explanation, ItemId, Recommendation, RecommendStats, SimilarItem, UserId,
    UserPreferences,
};
use crate::services::cold_start::{recompute_popularity, ColdStartHandler};
use crate::services::diversity::DiversityOptimizer;
use crate::services::events::{EventSink, RecommendationEvent};
use crate::services::explanation::ExplanationGenerator;
use crate::services::recall::{ScoringStrategy, StrategyContext};
use crate::services::registry::{StrategyFactory, StrategyRegistry};
use crate::services::similarity::{Entity, SimilarityMetric};
use crate::services::snapshot::{CatalogSource, Snapshot, SnapshotCache};
use anyhow::Context;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct RecommendationEngine {
    source: Arc<dyn CatalogSource>,
    config: EngineConfig,
    registry: StrategyRegistry,
    cache: SnapshotCache,
    sinks: Vec<Arc<dyn EventSink>>,
    cold_start: ColdStartHandler,
    explainer: ExplanationGenerator,
}

impl RecommendationEngine {
    pub fn new(source: Arc<dyn CatalogSource>, config: EngineConfig) -> Self {
        Self {
            source,
            config,
            registry: StrategyRegistry::with_defaults(),
            cache: SnapshotCache::new(),
            sinks: Vec::new(),
            cold_start: ColdStartHandler::new(),
            explainer: ExplanationGenerator::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Options seeded from the engine config
    pub fn default_options(&self) -> RecommendOptions {
        self.config.default_options()
    }

    pub fn register_strategy(
        &mut self,
        name: &str,
        description: &str,
        factory: StrategyFactory,
    ) -> Result<()> {
        self.registry.register(name, description, factory)
    }

    pub fn list_strategies(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn strategy_descriptions(&self) -> BTreeMap<String, String> {
        self.registry.descriptions()
    }

    pub fn subscribe(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    /// Current snapshot, rebuilt when the source rows changed.
    pub fn snapshot(&self) -> Result<Arc<Snapshot>> {
        let ratings = self
            .source
            .load_ratings()
            .context("Failed to load ratings")?;
        let items = self.source.load_items().context("Failed to load items")?;
        Ok(self.cache.get_or_build(&ratings, &items))
    }

    /// Drop the cached snapshot; the next request rebuilds it.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// Declared preferences of a user, straight from the source.
    pub fn user_preferences(&self, user_id: UserId) -> Result<UserPreferences> {
        self.source
            .load_user_preferences(user_id)
            .with_context(|| format!("Failed to load preferences for user {}", user_id))
            .map_err(RecommendError::from)
    }

    pub fn recommend(
        &self,
        user_id: UserId,
        strategy_name: &str,
        top_n: usize,
        options: &RecommendOptions,
    ) -> Result<Vec<Recommendation>> {
        options.validate()?;
        // resolve before touching the source so a bad name fails fast
        let strategy = self.registry.create(strategy_name, options)?;

        let snapshot = self.snapshot()?;
        let preferences = self.user_preferences(user_id)?;

        let (recommendations, stats) = self.run(
            &snapshot,
            &preferences,
            user_id,
            strategy.as_ref(),
            top_n,
            options,
        )?;

        info!(
            user_id,
            strategy = strategy_name,
            primary = stats.primary_count,
            cold_start = stats.cold_start_count,
            returned = stats.final_count,
            diversified = stats.diversified,
            "Recommendations generated"
        );

        let event = RecommendationEvent::new(
            user_id,
            strategy_name,
            snapshot.version,
            recommendations.clone(),
        );
        for sink in &self.sinks {
            sink.on_recommendations(&event);
        }

        Ok(recommendations)
    }

    /// Same pipeline over a caller-supplied snapshot; no sinks are notified.
    pub fn recommend_with_snapshot(
        &self,
        snapshot: &Snapshot,
        preferences: &UserPreferences,
        user_id: UserId,
        strategy_name: &str,
        top_n: usize,
        options: &RecommendOptions,
    ) -> Result<Vec<Recommendation>> {
        options.validate()?;
        let strategy = self.registry.create(strategy_name, options)?;
        self.run(snapshot, preferences, user_id, strategy.as_ref(), top_n, options)
            .map(|(recommendations, _)| recommendations)
    }

    fn run(
        &self,
        snapshot: &Snapshot,
        preferences: &UserPreferences,
        user_id: UserId,
        strategy: &dyn ScoringStrategy,
        top_n: usize,
        options: &RecommendOptions,
    ) -> Result<(Vec<Recommendation>, RecommendStats)> {
        let mut stats = RecommendStats::default();

        if top_n == 0 {
            return Ok((Vec::new(), stats));
        }

        let ctx = StrategyContext::new(snapshot, preferences);
        let category_filter = options
            .category_filter
            .as_deref()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty());
        let passes_category = |candidate: &Candidate| match &category_filter {
            Some(category) => snapshot
                .item(candidate.item_id)
                .is_some_and(|item| item.category.trim().to_lowercase() == *category),
            None => true,
        };

        let mut seen: HashSet<ItemId> = HashSet::new();
        let mut candidates: Vec<Candidate> = strategy
            .score(&ctx, user_id)
            .into_iter()
            .filter(|c| snapshot.is_active(c.item_id))
            .filter(|c| !snapshot.matrix.has_rated(user_id, c.item_id))
            .filter(|c| passes_category(c))
            .filter(|c| options.min_score.map_or(true, |min| c.raw_score >= min))
            .filter(|c| seen.insert(c.item_id))
            .collect();
        stats.primary_count = candidates.len();

        if candidates.len() < options.min_result_threshold {
            match self.cold_start.rank(snapshot, preferences) {
                Ok(fallback) => {
                    let before = candidates.len();
                    candidates.extend(
                        fallback
                            .into_iter()
                            .filter(|c| !snapshot.matrix.has_rated(user_id, c.item_id))
                            .filter(|c| passes_category(c))
                            .filter(|c| seen.insert(c.item_id)),
                    );
                    stats.cold_start_count = candidates.len() - before;
                    debug!(
                        user_id,
                        primary = before,
                        added = stats.cold_start_count,
                        "Merged cold start candidates"
                    );
                }
                Err(RecommendError::NoCatalogData) if candidates.is_empty() => {
                    return Err(RecommendError::NoCatalogData);
                }
                Err(e) => {
                    warn!(user_id, error = %e, "Cold start fallback unavailable");
                }
            }
        }

        candidates.truncate(top_n);

        let optimizer = DiversityOptimizer::new(options.diversity_lambda);
        if optimizer.lambda() > 0.0 {
            candidates = optimizer.rerank(candidates, &snapshot.features);
            stats.diversified = true;
        }

        let recommendations: Vec<Recommendation> = candidates
            .into_iter()
            .enumerate()
            .map(|(i, candidate)| Recommendation {
                item_id: candidate.item_id,
                final_score: candidate.raw_score,
                rank: i + 1,
                source: candidate.source,
                explanation: self.explainer.explain(&candidate, snapshot),
            })
            .collect();
        stats.final_count = recommendations.len();

        Ok((recommendations, stats))
    }

    /// Items most similar to `item_id` by feature cosine, active only.
    pub fn similar_items(&self, item_id: ItemId, n: usize) -> Result<Vec<SimilarItem>> {
        let snapshot = self.snapshot()?;
        if snapshot.features.vector(item_id).is_none() {
            return Err(RecommendError::InsufficientData(format!(
                "item {} has no feature vector",
                item_id
            )));
        }

        let similar = snapshot
            .similarity()
            .neighbors(
                Entity::Features(item_id),
                snapshot.features.len(),
                SimilarityMetric::Cosine,
            )
            .into_iter()
            .filter(|n| n.score > 0.0)
            .filter_map(|n| {
                snapshot
                    .item(n.id)
                    .filter(|item| item.is_active)
                    .map(|item| SimilarItem {
                        item_id: item.item_id,
                        name: item.display_name(),
                        category: item.category.clone(),
                        similarity: n.score,
                    })
            })
            .take(n)
            .collect();

        Ok(similar)
    }

    /// Why `strategy_name` would recommend `item_id` to `user_id`.
    pub fn explain(
        &self,
        user_id: UserId,
        item_id: ItemId,
        strategy_name: &str,
    ) -> Result<Explanation> {
        let options = self.default_options();
        let strategy = self.registry.create(strategy_name, &options)?;
        let snapshot = self.snapshot()?;
        let preferences = self.user_preferences(user_id)?;
        let ctx = StrategyContext::new(&snapshot, &preferences);

        let explanation = strategy
            .score(&ctx, user_id)
            .iter()
            .find(|c| c.item_id == item_id)
            .map(|c| self.explainer.explain(c, &snapshot))
            .unwrap_or_else(|| ExplanationGenerator::generic(strategy.source()));

        Ok(explanation)
    }

    /// Popularity per catalog item recomputed from ratings. Not persisted.
    pub fn recomputed_popularity(&self) -> Result<BTreeMap<ItemId, f64>> {
        let snapshot = self.snapshot()?;
        Ok(recompute_popularity(
            &snapshot.matrix,
            snapshot.items().map(|item| item.item_id),
        ))
    }
}
