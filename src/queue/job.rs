// src/queue/job.rs

use serde::{Deserialize, Serialize};

use crate::models::result_record::ResultRecord;

/// One unit of scoring work, referencing the placeholder record it will settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringJob {
    pub user_id: i64,
    pub exam_instance_id: i64,
    pub result_record_id: i64,
}

impl From<&ResultRecord> for ScoringJob {
    fn from(record: &ResultRecord) -> Self {
        Self {
            user_id: record.user_id,
            exam_instance_id: record.exam_instance_id,
            result_record_id: record.id,
        }
    }
}

/// Counters exposed for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    /// Enqueued but not finished yet.
    pub outstanding: u64,
}
