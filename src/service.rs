// src/service.rs

use std::sync::Arc;

use crate::{
    error::AppError,
    models::result_record::{PendingSubmission, ResultFilter, ResultRecord},
    queue::{ScoringJob, ScoringQueue},
    scoring::ScoreCalculator,
    store::ResultStore,
};

/// In-process entry points of the scoring core, used by the submission
/// handler, administrative recalculation and reporting readers.
#[derive(Clone)]
pub struct ScoringService {
    results: Arc<dyn ResultStore>,
    calculator: Arc<ScoreCalculator>,
    queue: Arc<ScoringQueue>,
}

impl ScoringService {
    pub fn new(
        results: Arc<dyn ResultStore>,
        calculator: Arc<ScoreCalculator>,
        queue: Arc<ScoringQueue>,
    ) -> Self {
        Self {
            results,
            calculator,
            queue,
        }
    }

    /// Records a PENDING result and schedules its scoring.
    ///
    /// Returns as soon as the placeholder is stored; the scoring outcome is only
    /// visible later through `results`.
    pub async fn submit(&self, submission: PendingSubmission) -> Result<i64, AppError> {
        let record_id = self.results.create_pending(&submission).await?;

        self.queue.enqueue(ScoringJob {
            user_id: submission.user_id,
            exam_instance_id: submission.exam_instance_id,
            result_record_id: record_id,
        });

        Ok(record_id)
    }

    /// Scores (user, exam) on the caller's task and returns the stored record.
    pub async fn recalculate(
        &self,
        user_id: i64,
        exam_instance_id: i64,
    ) -> Result<ResultRecord, AppError> {
        self.calculator.calculate(user_id, exam_instance_id).await
    }

    /// Re-scores every existing result of the given exam instances through the
    /// queue. Records go back to PENDING first so an interrupted batch is
    /// recovered at the next start. Returns the number of jobs enqueued.
    pub async fn recalculate_exams(&self, exam_instance_ids: &[i64]) -> Result<usize, AppError> {
        let mut enqueued = 0;

        for &exam_instance_id in exam_instance_ids {
            let records = self
                .results
                .list(&ResultFilter::for_exam(exam_instance_id))
                .await?;

            for record in &records {
                self.results.mark_pending(record.id).await?;
                self.queue.enqueue(ScoringJob::from(record));
                enqueued += 1;
            }

            tracing::info!(
                exam_instance_id,
                count = records.len(),
                "Recalculation scheduled"
            );
        }

        Ok(enqueued)
    }

    pub async fn results(&self, filter: &ResultFilter) -> Result<Vec<ResultRecord>, AppError> {
        self.results.list(filter).await
    }

    pub async fn result(
        &self,
        user_id: i64,
        exam_instance_id: i64,
    ) -> Result<Option<ResultRecord>, AppError> {
        self.results.find(user_id, exam_instance_id).await
    }
}
