// ============================================
// Batch Recommend Job (批量推薦任務)
// ============================================
//
// Runs the engine over a JSON data snapshot for a set of users.
// Designed to run as a Kubernetes CronJob or standalone process.
//
// Workflow:
// 1. Load ratings, items and preferences from the snapshot file
// 2. Build the shared snapshot once
// 3. Compute recommendations for each user on the blocking pool
// 4. Emit one JSON line per user
//
// Usage:
//   RECOMMENDER_BATCH_DATA_PATH=data/books.json recommendation-engine

use crate::config::EngineConfig;
use crate::engine::RecommendationEngine;
use crate::models::{ItemRecord, RatingRecord, Recommendation, UserId, UserPreferences};
use crate::services::snapshot::InMemoryCatalog;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Batch job configuration, read from `RECOMMENDER_BATCH_*`
#[derive(Debug, Clone, Deserialize)]
pub struct BatchJobConfig {
    #[serde(default = "default_data_path")]
    pub data_path: String,
    /// Users to process; empty means every known user
    #[serde(default)]
    pub user_ids: Vec<UserId>,
    /// Falls back to the engine's default strategy
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub top_n: Option<usize>,
    /// Users computed concurrently per wave
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_data_path() -> String {
    "data/snapshot.json".to_string()
}

fn default_concurrency() -> usize {
    8
}

impl Default for BatchJobConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            user_ids: Vec::new(),
            strategy: None,
            top_n: None,
            concurrency: default_concurrency(),
        }
    }
}

impl BatchJobConfig {
    pub fn from_env() -> Result<Self> {
        envy::prefixed("RECOMMENDER_BATCH_")
            .from_env()
            .context("Failed to read RECOMMENDER_BATCH_* configuration")
    }
}

/// On-disk data snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotFile {
    #[serde(default)]
    pub ratings: Vec<RatingRecord>,
    #[serde(default)]
    pub items: Vec<ItemRecord>,
    #[serde(default)]
    pub preferences: HashMap<UserId, UserPreferences>,
}

impl SnapshotFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse snapshot file {}", path.display()))
    }

    pub fn into_catalog(self) -> InMemoryCatalog {
        self.preferences.into_iter().fold(
            InMemoryCatalog::new(self.ratings, self.items),
            |catalog, (user_id, prefs)| catalog.with_preferences(user_id, prefs),
        )
    }
}

/// One output line
#[derive(Debug, Clone, Serialize)]
pub struct UserRecommendations {
    pub user_id: UserId,
    pub strategy: String,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchJobStats {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub users_processed: u32,
    pub users_succeeded: u32,
    pub users_failed: u32,
    pub rejected_records: usize,
    pub total_duration_ms: u64,
}

pub struct BatchRecommendJob {
    config: BatchJobConfig,
    engine: Arc<RecommendationEngine>,
    user_ids: Vec<UserId>,
}

impl BatchRecommendJob {
    pub fn new(config: BatchJobConfig, engine: Arc<RecommendationEngine>, known_users: Vec<UserId>) -> Self {
        let user_ids = if config.user_ids.is_empty() {
            known_users
        } else {
            config.user_ids.clone()
        };

        Self {
            config,
            engine,
            user_ids,
        }
    }

    /// Load the snapshot file and wire up an engine over it
    pub fn from_file(config: BatchJobConfig, engine_config: EngineConfig) -> Result<Self> {
        let catalog = SnapshotFile::load(&config.data_path)?.into_catalog();
        let known_users = catalog.user_ids();
        let engine = RecommendationEngine::new(Arc::new(catalog), engine_config);
        Ok(Self::new(config, Arc::new(engine), known_users))
    }

    pub async fn run(&self) -> Result<(Vec<UserRecommendations>, BatchJobStats)> {
        let start_time = Instant::now();
        let mut stats = BatchJobStats {
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        let strategy = self
            .config
            .strategy
            .clone()
            .unwrap_or_else(|| self.engine.config().default_strategy.clone());
        let top_n = self
            .config
            .top_n
            .unwrap_or(self.engine.config().default_top_n);
        let options = self.engine.default_options();

        // built once; workers only load per-user preferences
        let snapshot = self.engine.snapshot().context("Failed to build snapshot")?;
        stats.rejected_records = snapshot.diagnostics.len();

        info!(
            users = self.user_ids.len(),
            strategy = %strategy,
            top_n,
            concurrency = self.config.concurrency,
            rejected_records = stats.rejected_records,
            "Starting batch recommend job"
        );

        let mut output = Vec::with_capacity(self.user_ids.len());
        for (wave_idx, wave) in self
            .user_ids
            .chunks(self.config.concurrency.max(1))
            .enumerate()
        {
            let tasks = wave.iter().map(|&user_id| {
                let engine = Arc::clone(&self.engine);
                let snapshot = Arc::clone(&snapshot);
                let strategy = strategy.clone();
                let options = options.clone();
                tokio::task::spawn_blocking(move || {
                    let result = engine.user_preferences(user_id).and_then(|prefs| {
                        engine.recommend_with_snapshot(
                            &snapshot, &prefs, user_id, &strategy, top_n, &options,
                        )
                    });
                    (user_id, result)
                })
            });

            for joined in futures::future::join_all(tasks).await {
                stats.users_processed += 1;
                match joined {
                    Ok((user_id, Ok(recommendations))) => {
                        stats.users_succeeded += 1;
                        output.push(UserRecommendations {
                            user_id,
                            strategy: strategy.clone(),
                            recommendations,
                        });
                    }
                    Ok((user_id, Err(e))) => {
                        stats.users_failed += 1;
                        error!(user_id, error = %e, "Failed to compute recommendations");
                    }
                    Err(e) => {
                        stats.users_failed += 1;
                        error!(error = %e, "Recommendation task panicked");
                    }
                }
            }

            info!(wave = wave_idx + 1, users = wave.len(), "Processed user wave");
        }

        stats.completed_at = Some(Utc::now());
        stats.total_duration_ms = start_time.elapsed().as_millis() as u64;

        Ok((output, stats))
    }
}

/// Entry point for running the batch job as a standalone process
pub async fn run_batch_recommend_job() -> Result<BatchJobStats> {
    info!("Initializing batch recommend job");

    let engine_config = EngineConfig::from_env().context("Failed to load engine config")?;
    let batch_config = BatchJobConfig::from_env()?;

    let job = BatchRecommendJob::from_file(batch_config, engine_config)?;
    let (output, stats) = job.run().await?;

    for line in &output {
        println!(
            "{}",
            serde_json::to_string(line).context("Failed to serialize recommendations")?
        );
    }

    info!(
        processed = stats.users_processed,
        succeeded = stats.users_succeeded,
        failed = stats.users_failed,
        duration_ms = stats.total_duration_ms,
        "Batch recommend job completed"
    );

    Ok(stats)
}
