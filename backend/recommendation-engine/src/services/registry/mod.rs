// ============================================
// Strategy Registry (策略註冊表)
// ============================================
//
// Name → factory table. Factories build a fresh strategy from the
// request options, so per-request tuning never leaks across calls.

use crate::config::RecommendOptions;
use crate::error::{RecommendError, Result};
use crate::services::cold_start::ColdStartHandler;
use crate::services::recall::{
    CollaborativeStrategy, ContentStrategy, HybridStrategy, ScoringStrategy,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

pub type StrategyFactory =
    Arc<dyn Fn(&RecommendOptions) -> Box<dyn ScoringStrategy> + Send + Sync>;

/// Wrap a closure as a StrategyFactory
pub fn strategy_factory<F>(factory: F) -> StrategyFactory
where
    F: Fn(&RecommendOptions) -> Box<dyn ScoringStrategy> + Send + Sync + 'static,
{
    Arc::new(factory)
}

struct Registration {
    description: String,
    factory: StrategyFactory,
}

#[derive(Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Registration>,
    aliases: BTreeMap<String, String>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in strategies
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, &str, StrategyFactory); 4] = [
            (
                "collaborative",
                "Ratings from users with similar taste",
                strategy_factory(|o| Box::new(CollaborativeStrategy::from_options(o))),
            ),
            (
                "content-based",
                "Items similar to what the user liked",
                strategy_factory(|o| Box::new(ContentStrategy::from_options(o))),
            ),
            (
                "hybrid",
                "Weighted blend of collaborative and content-based",
                strategy_factory(|o| Box::new(HybridStrategy::from_options(o))),
            ),
            (
                "cold-start",
                "Declared category preferences, then popularity",
                strategy_factory(|_| Box::new(ColdStartHandler::new())),
            ),
        ];

        for (name, description, factory) in builtins {
            registry.strategies.insert(
                name.to_string(),
                Registration {
                    description: description.to_string(),
                    factory,
                },
            );
        }
        registry
            .aliases
            .insert("content".to_string(), "content-based".to_string());

        registry
    }

    pub fn register(
        &mut self,
        name: &str,
        description: &str,
        factory: StrategyFactory,
    ) -> Result<()> {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return Err(RecommendError::InvalidOptions(
                "strategy name cannot be empty".to_string(),
            ));
        }
        if self.strategies.contains_key(&name) || self.aliases.contains_key(&name) {
            return Err(RecommendError::DuplicateStrategy(name));
        }

        info!(strategy = %name, "Registered recommendation strategy");
        self.strategies.insert(
            name,
            Registration {
                description: description.to_string(),
                factory,
            },
        );
        Ok(())
    }

    /// Build the named strategy (case-insensitive, aliases allowed).
    pub fn create(&self, name: &str, options: &RecommendOptions) -> Result<Box<dyn ScoringStrategy>> {
        let key = name.trim().to_lowercase();
        let key = self.aliases.get(&key).cloned().unwrap_or(key);

        match self.strategies.get(&key) {
            Some(registration) => Ok((registration.factory)(options)),
            None => Err(RecommendError::UnknownStrategy {
                name: name.to_string(),
                available: self.names().join(", "),
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        let key = name.trim().to_lowercase();
        self.strategies.contains_key(&key) || self.aliases.contains_key(&key)
    }

    /// Registered names in lexicographic order (aliases excluded)
    pub fn names(&self) -> Vec<String> {
        self.strategies.keys().cloned().collect()
    }

    pub fn descriptions(&self) -> BTreeMap<String, String> {
        self.strategies
            .iter()
            .map(|(name, r)| (name.clone(), r.description.clone()))
            .collect()
    }
}
