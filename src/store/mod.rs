// src/store/mod.rs
//
// Storage seams of the scoring core. `postgres` backs the running service,
// `memory` backs tests and embedders that do not need a database.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        conversion::{ConversionDetail, ConversionTable, NewConversionTable},
        exam::{ExamInstance, SubmittedAnswer},
        result_record::{PendingSubmission, ResultFilter, ResultRecord, ScoreSummary},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence of result records. Written only by the scoring pipeline.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Upserts a PENDING placeholder for (user, exam) and returns its id.
    async fn create_pending(&self, submission: &PendingSubmission) -> Result<i64, AppError>;

    /// Writes the computed numbers and `Completed` status in one statement.
    async fn save_completed(
        &self,
        user_id: i64,
        exam_instance_id: i64,
        summary: &ScoreSummary,
    ) -> Result<ResultRecord, AppError>;

    async fn mark_failed(&self, record_id: i64, reason: &str) -> Result<(), AppError>;

    async fn mark_pending(&self, record_id: i64) -> Result<(), AppError>;

    async fn find(&self, user_id: i64, exam_instance_id: i64)
    -> Result<Option<ResultRecord>, AppError>;

    async fn find_by_id(&self, record_id: i64) -> Result<Option<ResultRecord>, AppError>;

    /// Ordered by id.
    async fn list(&self, filter: &ResultFilter) -> Result<Vec<ResultRecord>, AppError>;
}

/// Named scoring tables and their rows.
#[async_trait]
pub trait ConversionStore: Send + Sync {
    /// Inserts a table with its rows; unsets other defaults when `is_default` is set.
    async fn create_table(&self, req: &NewConversionTable) -> Result<ConversionTable, AppError>;

    /// Makes `table_id` the only default table.
    async fn set_default(&self, table_id: i64) -> Result<(), AppError>;

    async fn find_table(&self, table_id: i64) -> Result<Option<ConversionTable>, AppError>;

    async fn find_default(&self) -> Result<Option<ConversionTable>, AppError>;

    async fn list_tables(&self) -> Result<Vec<ConversionTable>, AppError>;

    async fn details(&self, table_id: i64) -> Result<Vec<ConversionDetail>, AppError>;
}

/// Exam content and submitted answers, owned by other components.
#[async_trait]
pub trait ExamSource: Send + Sync {
    async fn find_exam(&self, exam_instance_id: i64) -> Result<Option<ExamInstance>, AppError>;

    async fn submitted_answers(
        &self,
        user_id: i64,
        exam_instance_id: i64,
    ) -> Result<Vec<SubmittedAnswer>, AppError>;
}
