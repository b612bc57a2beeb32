// ============================================
// Recommendation Events (推薦事件通知)
// ============================================
//
// Sinks are notified synchronously after each successful request.
// ActivityRecorder keeps an in-memory per-user log of delivered
// recommendations.

use crate::models::{ItemId, Recommendation, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationEvent {
    pub request_id: Uuid,
    pub user_id: UserId,
    pub strategy: String,
    pub snapshot_version: u64,
    pub recommendations: Vec<Recommendation>,
    pub created_at: DateTime<Utc>,
}

impl RecommendationEvent {
    pub fn new(
        user_id: UserId,
        strategy: &str,
        snapshot_version: u64,
        recommendations: Vec<Recommendation>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user_id,
            strategy: strategy.to_string(),
            snapshot_version,
            recommendations,
            created_at: Utc::now(),
        }
    }
}

/// Receives one event per completed recommend() call.
pub trait EventSink: Send + Sync {
    fn on_recommendations(&self, event: &RecommendationEvent);
}

/// One recommendation delivered to a user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserActivity {
    pub request_id: Uuid,
    pub item_id: ItemId,
    pub rank: usize,
    pub strategy: String,
    pub recorded_at: DateTime<Utc>,
}

/// Per-user activities retained by default
pub const DEFAULT_ACTIVITY_CAPACITY: usize = 500;

/// In-memory activity log fed by recommendation events.
/// Each user keeps at most `capacity` entries; the oldest are dropped first.
#[derive(Debug)]
pub struct ActivityRecorder {
    activities: RwLock<HashMap<UserId, VecDeque<UserActivity>>>,
    capacity: usize,
}

impl Default for ActivityRecorder {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ACTIVITY_CAPACITY)
    }
}

impl ActivityRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            activities: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Most recent first
    pub fn get_user_activities(&self, user_id: UserId, limit: usize) -> Vec<UserActivity> {
        let activities = self
            .activities
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        activities
            .get(&user_id)
            .map(|list| list.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Total recorded activities across users
    pub fn event_count(&self) -> usize {
        self.activities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(VecDeque::len)
            .sum()
    }

    pub fn clear(&self) {
        self.activities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventSink for ActivityRecorder {
    fn on_recommendations(&self, event: &RecommendationEvent) {
        let mut activities = self
            .activities
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let list = activities.entry(event.user_id).or_default();
        list.extend(event.recommendations.iter().map(|rec| UserActivity {
            request_id: event.request_id,
            item_id: rec.item_id,
            rank: rec.rank,
            strategy: event.strategy.clone(),
            recorded_at: event.created_at,
        }));
        let overflow = list.len().saturating_sub(self.capacity);
        list.drain(..overflow);

        debug!(
            request_id = %event.request_id,
            user_id = event.user_id,
            recorded = event.recommendations.len(),
            "Recommendation activity recorded"
        );
    }
}
