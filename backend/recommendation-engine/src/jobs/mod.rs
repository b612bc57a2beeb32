// ============================================
// Background Jobs Module (後台任務模組)
// ============================================
//
// Contains background job runners for:
// 1. Batch recommendation over a data snapshot file
//
// These jobs can be triggered via:
// - CronJob (Kubernetes)
// - The recommendation-engine binary

pub mod batch_recommend;

pub use batch_recommend::{
    run_batch_recommend_job, BatchJobConfig, BatchJobStats, BatchRecommendJob, SnapshotFile,
};
