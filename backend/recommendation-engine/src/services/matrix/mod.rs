// ============================================
// Interaction Matrix (用戶-物品評分矩陣)
// ============================================
//
// Sparse user x item rating structure built from a flat list of
// rating records. Row view (user -> items) feeds user-based CF,
// column view (item -> users) feeds item neighbor lookups.
//
// Absence of an entry means "unobserved", never "rating zero".

use crate::error::{IngestReport, RecordKind, RejectedRecord, ValidationError};
use crate::models::{ItemId, RatingRecord, UserId, MAX_RATING, MIN_RATING};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Sparse vector keyed by entity id.
pub type SparseVector = BTreeMap<u64, f64>;

/// Aggregate rating statistics for one item
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemStats {
    pub count: usize,
    pub mean: f64,
}

#[derive(Debug, Clone, Default)]
pub struct InteractionMatrix {
    rows: BTreeMap<UserId, SparseVector>,
    columns: BTreeMap<ItemId, SparseVector>,
    empty: SparseVector,
    len: usize,
}

impl InteractionMatrix {
    /// Build from rating records.
    ///
    /// Records with a value outside 1..=5 or a repeated (user, item) pair are
    /// rejected and reported; the first occurrence of a pair is kept.
    pub fn build(records: &[RatingRecord]) -> IngestReport<Self> {
        let mut matrix = InteractionMatrix::default();
        let mut rejected = Vec::new();

        for (index, record) in records.iter().enumerate() {
            if !(MIN_RATING..=MAX_RATING).contains(&record.value) {
                rejected.push(RejectedRecord {
                    index,
                    kind: RecordKind::Rating,
                    error: ValidationError::RatingOutOfRange {
                        value: record.value,
                    },
                });
                continue;
            }

            let row = matrix.rows.entry(record.user_id).or_default();
            match row.entry(record.item_id) {
                Entry::Occupied(_) => {
                    rejected.push(RejectedRecord {
                        index,
                        kind: RecordKind::Rating,
                        error: ValidationError::DuplicateRating {
                            user_id: record.user_id,
                            item_id: record.item_id,
                        },
                    });
                    continue;
                }
                Entry::Vacant(slot) => {
                    slot.insert(record.value as f64);
                }
            }

            matrix
                .columns
                .entry(record.item_id)
                .or_default()
                .insert(record.user_id, record.value as f64);
            matrix.len += 1;
        }

        for rejection in &rejected {
            warn!(
                index = rejection.index,
                error = %rejection.error,
                "Rejected rating record"
            );
        }

        debug!(
            users = matrix.rows.len(),
            items = matrix.columns.len(),
            ratings = matrix.len,
            rejected = rejected.len(),
            "Interaction matrix built"
        );

        IngestReport {
            value: matrix,
            rejected,
        }
    }

    /// Ratings of one user; empty for unknown users
    pub fn row(&self, user_id: UserId) -> &SparseVector {
        self.rows.get(&user_id).unwrap_or(&self.empty)
    }

    /// Ratings received by one item; empty for unknown items
    pub fn column(&self, item_id: ItemId) -> &SparseVector {
        self.columns.get(&item_id).unwrap_or(&self.empty)
    }

    /// Mean rating of a user, None if the user has no ratings
    pub fn mean_rating(&self, user_id: UserId) -> Option<f64> {
        mean(self.row(user_id))
    }

    pub fn rating(&self, user_id: UserId, item_id: ItemId) -> Option<f64> {
        self.row(user_id).get(&item_id).copied()
    }

    pub fn has_rated(&self, user_id: UserId, item_id: ItemId) -> bool {
        self.row(user_id).contains_key(&item_id)
    }

    /// Number of items rated by both users
    pub fn co_rated_count(&self, a: UserId, b: UserId) -> usize {
        let (small, large) = {
            let (ra, rb) = (self.row(a), self.row(b));
            if ra.len() <= rb.len() {
                (ra, rb)
            } else {
                (rb, ra)
            }
        };
        small.keys().filter(|item| large.contains_key(item)).count()
    }

    pub fn item_stats(&self, item_id: ItemId) -> Option<ItemStats> {
        let column = self.column(item_id);
        mean(column).map(|mean| ItemStats {
            count: column.len(),
            mean,
        })
    }

    pub fn users(&self) -> impl Iterator<Item = UserId> + '_ {
        self.rows.keys().copied()
    }

    pub fn items(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.columns.keys().copied()
    }

    pub fn num_users(&self) -> usize {
        self.rows.len()
    }

    pub fn num_items(&self) -> usize {
        self.columns.len()
    }

    /// Number of stored ratings
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn mean(values: &SparseVector) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.values().sum::<f64>() / values.len() as f64)
    }
}
