// src/models/result_record.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle of a result record.
///
/// `Pending` is written at submission time; the scoring worker moves it to
/// `Completed` or `Failed`. Only the startup reconciler picks up `Pending` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "result_status", rename_all = "lowercase")]
pub enum ResultStatus {
    Pending,
    Completed,
    Failed,
}

/// Represents the 'result_records' table in the database.
/// One row per (user, exam instance).
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: i64,
    pub user_id: i64,
    pub exam_instance_id: i64,
    pub total_questions: i64,
    pub correct_count: i64,
    pub wrong_count: i64,
    pub score: i64,
    pub status: ResultStatus,
    pub failure_reason: Option<String>,

    /// When the underlying submission happened, not when scoring finished.
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Output of the score calculator. `total_questions == correct_count + wrong_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub total_questions: i64,
    pub correct_count: i64,
    pub wrong_count: i64,
    pub score: i64,
}

/// Input of the submission handler when it creates the placeholder record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PendingSubmission {
    pub user_id: i64,
    pub exam_instance_id: i64,
    pub submitted_at: DateTime<Utc>,
}

impl PendingSubmission {
    pub fn now(user_id: i64, exam_instance_id: i64) -> Self {
        Self {
            user_id,
            exam_instance_id,
            submitted_at: Utc::now(),
        }
    }
}

/// Filter for reporting reads. Unset fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultFilter {
    pub user_id: Option<i64>,
    pub exam_instance_id: Option<i64>,
    pub status: Option<ResultStatus>,
}

impl ResultFilter {
    pub fn pending() -> Self {
        Self {
            status: Some(ResultStatus::Pending),
            ..Default::default()
        }
    }

    pub fn for_exam(exam_instance_id: i64) -> Self {
        Self {
            exam_instance_id: Some(exam_instance_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &ResultRecord) -> bool {
        self.user_id.is_none_or(|id| id == record.user_id)
            && self.exam_instance_id.is_none_or(|id| id == record.exam_instance_id)
            && self.status.is_none_or(|s| s == record.status)
    }
}
