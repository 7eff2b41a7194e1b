// src/store/postgres.rs

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
    error::AppError,
    models::{
        conversion::{ConversionDetail, ConversionTable, NewConversionTable},
        exam::{ExamInstance, ScoringConfig, ScoringPolicy, ScoringType, Section, SubmittedAnswer},
        result_record::{PendingSubmission, ResultFilter, ResultRecord, ScoreSummary},
    },
    store::{ConversionStore, ExamSource, ResultStore},
};

const RESULT_COLUMNS: &str = r#"
    id, user_id, exam_instance_id, total_questions, correct_count, wrong_count,
    score, status, failure_reason, submitted_at, completed_at, updated_at
"#;

/// Postgres-backed implementation of every storage seam.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Helper struct for fetching an exam row before its sections are attached.
#[derive(sqlx::FromRow)]
struct ExamRow {
    id: i64,
    scoring_type: ScoringType,
    /// Decoded by hand so a malformed document surfaces as a configuration error.
    scoring_config: Option<serde_json::Value>,
}

#[async_trait]
impl ResultStore for PgStore {
    async fn create_pending(&self, submission: &PendingSubmission) -> Result<i64, AppError> {
        // An existing record is reset to pending; its numbers stay until rescored.
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO result_records (user_id, exam_instance_id, status, submitted_at)
            VALUES ($1, $2, 'pending', $3)
            ON CONFLICT (user_id, exam_instance_id) DO UPDATE SET
                status = 'pending',
                failure_reason = NULL,
                submitted_at = EXCLUDED.submitted_at,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(submission.user_id)
        .bind(submission.exam_instance_id)
        .bind(submission.submitted_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create pending result: {:?}", e);
            AppError::from(e)
        })?;

        Ok(id)
    }

    async fn save_completed(
        &self,
        user_id: i64,
        exam_instance_id: i64,
        summary: &ScoreSummary,
    ) -> Result<ResultRecord, AppError> {
        let query = format!(
            r#"
            INSERT INTO result_records
                (user_id, exam_instance_id, total_questions, correct_count, wrong_count,
                 score, status, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'completed', NOW())
            ON CONFLICT (user_id, exam_instance_id) DO UPDATE SET
                total_questions = EXCLUDED.total_questions,
                correct_count = EXCLUDED.correct_count,
                wrong_count = EXCLUDED.wrong_count,
                score = EXCLUDED.score,
                status = 'completed',
                failure_reason = NULL,
                completed_at = NOW(),
                updated_at = NOW()
            RETURNING {}
            "#,
            RESULT_COLUMNS
        );

        let record = sqlx::query_as::<_, ResultRecord>(&query)
            .bind(user_id)
            .bind(exam_instance_id)
            .bind(summary.total_questions)
            .bind(summary.correct_count)
            .bind(summary.wrong_count)
            .bind(summary.score)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to upsert result record: {:?}", e);
                AppError::from(e)
            })?;

        Ok(record)
    }

    async fn mark_failed(&self, record_id: i64, reason: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE result_records
            SET status = 'failed', failure_reason = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(record_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Result record {} not found", record_id)));
        }
        Ok(())
    }

    async fn mark_pending(&self, record_id: i64) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE result_records
            SET status = 'pending', failure_reason = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(record_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Result record {} not found", record_id)));
        }
        Ok(())
    }

    async fn find(
        &self,
        user_id: i64,
        exam_instance_id: i64,
    ) -> Result<Option<ResultRecord>, AppError> {
        let query = format!(
            "SELECT {} FROM result_records WHERE user_id = $1 AND exam_instance_id = $2",
            RESULT_COLUMNS
        );
        let record = sqlx::query_as::<_, ResultRecord>(&query)
            .bind(user_id)
            .bind(exam_instance_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn find_by_id(&self, record_id: i64) -> Result<Option<ResultRecord>, AppError> {
        let query = format!("SELECT {} FROM result_records WHERE id = $1", RESULT_COLUMNS);
        let record = sqlx::query_as::<_, ResultRecord>(&query)
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn list(&self, filter: &ResultFilter) -> Result<Vec<ResultRecord>, AppError> {
        // Use QueryBuilder for the optional WHERE clauses
        let mut query_builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM result_records WHERE TRUE",
            RESULT_COLUMNS
        ));

        if let Some(user_id) = filter.user_id {
            query_builder.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(exam_instance_id) = filter.exam_instance_id {
            query_builder
                .push(" AND exam_instance_id = ")
                .push_bind(exam_instance_id);
        }
        if let Some(status) = filter.status {
            query_builder.push(" AND status = ").push_bind(status);
        }
        query_builder.push(" ORDER BY id");

        let records = query_builder
            .build_query_as::<ResultRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }
}

#[async_trait]
impl ConversionStore for PgStore {
    async fn create_table(&self, req: &NewConversionTable) -> Result<ConversionTable, AppError> {
        req.check()?;

        let mut tx = self.pool.begin().await?;

        if req.is_default {
            sqlx::query("UPDATE conversion_tables SET is_default = FALSE WHERE is_default")
                .execute(&mut *tx)
                .await?;
        }

        let table = sqlx::query_as::<_, ConversionTable>(
            r#"
            INSERT INTO conversion_tables (name, description, is_default)
            VALUES ($1, $2, $3)
            RETURNING id, name, description, is_default, created_at
            "#,
        )
        .bind(&req.name)
        .bind(&req.description)
        .bind(req.is_default)
        .fetch_one(&mut *tx)
        .await?;

        if !req.details.is_empty() {
            let mut query_builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO conversion_details (table_id, section_category, correct_count, converted_score) ",
            );
            query_builder.push_values(&req.details, |mut row, detail| {
                row.push_bind(table.id)
                    .push_bind(detail.section_category.trim().to_string())
                    .push_bind(detail.correct_count)
                    .push_bind(detail.converted_score);
            });
            query_builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        tracing::info!(table_id = table.id, default = table.is_default, "Conversion table created");
        Ok(table)
    }

    async fn set_default(&self, table_id: i64) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE conversion_tables SET is_default = FALSE WHERE is_default AND id <> $1")
            .bind(table_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("UPDATE conversion_tables SET is_default = TRUE WHERE id = $1")
            .bind(table_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls back the unset above.
            return Err(AppError::NotFound(format!(
                "Conversion table {} not found",
                table_id
            )));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_table(&self, table_id: i64) -> Result<Option<ConversionTable>, AppError> {
        let table = sqlx::query_as::<_, ConversionTable>(
            "SELECT id, name, description, is_default, created_at FROM conversion_tables WHERE id = $1",
        )
        .bind(table_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(table)
    }

    async fn find_default(&self) -> Result<Option<ConversionTable>, AppError> {
        let table = sqlx::query_as::<_, ConversionTable>(
            r#"
            SELECT id, name, description, is_default, created_at
            FROM conversion_tables
            WHERE is_default
            ORDER BY id
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(table)
    }

    async fn list_tables(&self) -> Result<Vec<ConversionTable>, AppError> {
        let tables = sqlx::query_as::<_, ConversionTable>(
            "SELECT id, name, description, is_default, created_at FROM conversion_tables ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(tables)
    }

    async fn details(&self, table_id: i64) -> Result<Vec<ConversionDetail>, AppError> {
        let details = sqlx::query_as::<_, ConversionDetail>(
            r#"
            SELECT id, table_id, section_category, correct_count, converted_score
            FROM conversion_details
            WHERE table_id = $1
            ORDER BY section_category, correct_count
            "#,
        )
        .bind(table_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(details)
    }
}

#[async_trait]
impl ExamSource for PgStore {
    async fn find_exam(&self, exam_instance_id: i64) -> Result<Option<ExamInstance>, AppError> {
        let Some(row) = sqlx::query_as::<_, ExamRow>(
            "SELECT id, scoring_type, scoring_config FROM exam_instances WHERE id = $1",
        )
        .bind(exam_instance_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };
        let config = ScoringConfig::from_column(row.scoring_config)?;

        let sections = sqlx::query_as::<_, Section>(
            r#"
            SELECT id, category, conversion_table_id
            FROM exam_sections
            WHERE exam_instance_id = $1
            ORDER BY id
            "#,
        )
        .bind(exam_instance_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(ExamInstance {
            id: row.id,
            policy: ScoringPolicy {
                scoring_type: row.scoring_type,
                config,
            },
            sections,
        }))
    }

    async fn submitted_answers(
        &self,
        user_id: i64,
        exam_instance_id: i64,
    ) -> Result<Vec<SubmittedAnswer>, AppError> {
        let answers = sqlx::query_as::<_, SubmittedAnswer>(
            r#"
            SELECT sa.question_id, sa.section_id, o.is_correct
            FROM submitted_answers sa
            JOIN question_options o ON o.id = sa.option_id
            WHERE sa.user_id = $1 AND sa.exam_instance_id = $2
            ORDER BY sa.question_id
            "#,
        )
        .bind(user_id)
        .bind(exam_instance_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(answers)
    }
}
