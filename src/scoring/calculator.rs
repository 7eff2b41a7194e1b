// src/scoring/calculator.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::{
    error::AppError,
    models::{
        exam::{ExamInstance, ScoringType, SubmittedAnswer},
        result_record::{ResultRecord, ScoreSummary},
    },
    scoring::{CategoryResolver, ConversionLookup, raw_score, scale_score, tally},
    store::{ConversionStore, ExamSource, ResultStore},
    utils::keyed_lock::{KeyedGuard, KeyedLocks},
};

/// Computes a user's result for one exam instance and persists it.
///
/// Errors are never swallowed here; callers (the queue worker or an
/// administrative trigger) decide what a failure means.
pub struct ScoreCalculator {
    exams: Arc<dyn ExamSource>,
    tables: Arc<dyn ConversionStore>,
    results: Arc<dyn ResultStore>,
    categories: CategoryResolver,
    locks: KeyedLocks<(i64, i64)>,
}

impl ScoreCalculator {
    pub fn new(
        exams: Arc<dyn ExamSource>,
        tables: Arc<dyn ConversionStore>,
        results: Arc<dyn ResultStore>,
        categories: CategoryResolver,
    ) -> Self {
        Self {
            exams,
            tables,
            results,
            categories,
            locks: KeyedLocks::new(),
        }
    }

    /// Computes and upserts the result for (user, exam), marking it completed.
    ///
    /// Calls for the same pair are serialized so the last write reflects the
    /// last computation.
    pub async fn calculate(
        &self,
        user_id: i64,
        exam_instance_id: i64,
    ) -> Result<ResultRecord, AppError> {
        let _guard = self.lock_pair(user_id, exam_instance_id).await;
        self.calculate_locked(user_id, exam_instance_id).await
    }

    /// Takes the lock `calculate` uses for (user, exam). Callers that also
    /// write a failure outcome hold it until that write is done.
    pub async fn lock_pair(
        &self,
        user_id: i64,
        exam_instance_id: i64,
    ) -> KeyedGuard<'_, (i64, i64)> {
        self.locks.lock((user_id, exam_instance_id)).await
    }

    /// `calculate` for a caller already holding the guard from `lock_pair`.
    pub async fn calculate_locked(
        &self,
        user_id: i64,
        exam_instance_id: i64,
    ) -> Result<ResultRecord, AppError> {
        let summary = self.compute(user_id, exam_instance_id).await?;
        let record = self
            .results
            .save_completed(user_id, exam_instance_id, &summary)
            .await?;

        tracing::debug!(
            record_id = record.id,
            user_id,
            exam_instance_id,
            score = summary.score,
            "Result record saved"
        );
        Ok(record)
    }

    /// Computes the summary without writing anything.
    pub async fn compute(
        &self,
        user_id: i64,
        exam_instance_id: i64,
    ) -> Result<ScoreSummary, AppError> {
        let exam = self
            .exams
            .find_exam(exam_instance_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Exam instance {} not found", exam_instance_id))
            })?;

        let answers = self
            .exams
            .submitted_answers(user_id, exam_instance_id)
            .await?;

        let (total_questions, correct_count, wrong_count) = tally(&answers);

        let score = match exam.policy.scoring_type {
            ScoringType::Raw => raw_score(exam.policy.config.initial_score()?, correct_count)?,
            ScoringType::Scale => self.scaled(&exam, &answers).await?,
        };

        Ok(ScoreSummary {
            total_questions,
            correct_count,
            wrong_count,
            score,
        })
    }

    async fn scaled(
        &self,
        exam: &ExamInstance,
        answers: &[SubmittedAnswer],
    ) -> Result<i64, AppError> {
        // section id -> correct answers, ascending by section for a stable order
        let mut per_section: BTreeMap<i64, i64> = BTreeMap::new();
        for answer in answers {
            *per_section.entry(answer.section_id).or_default() += i64::from(answer.is_correct);
        }

        let mut lookups: HashMap<i64, ConversionLookup> = HashMap::new();
        let mut default_table: Option<i64> = None;
        let mut converted = Vec::with_capacity(per_section.len());

        for (section_id, correct) in per_section {
            let section = exam.section(section_id).ok_or_else(|| {
                AppError::NotFound(format!(
                    "Section {} not found in exam instance {}",
                    section_id, exam.id
                ))
            })?;

            let table_id = match section.conversion_table_id {
                Some(id) => id,
                None => match default_table {
                    Some(id) => id,
                    None => {
                        let id = self.default_table_id(exam.id).await?;
                        default_table = Some(id);
                        id
                    }
                },
            };

            if !lookups.contains_key(&table_id) {
                let lookup = self.load_lookup(table_id).await?;
                lookups.insert(table_id, lookup);
            }
            let lookup = &lookups[&table_id];

            let category = self
                .categories
                .resolve(&section.category, lookup)
                .ok_or_else(|| {
                    AppError::ConfigurationError(format!(
                        "Section category '{}' has no rows in conversion table {}",
                        section.category, table_id
                    ))
                })?;

            let score = lookup.convert(&category, correct).ok_or_else(|| {
                AppError::ConfigurationError(format!(
                    "Conversion table {} has no rows for category '{}'",
                    table_id, category
                ))
            })?;
            converted.push(score);
        }

        Ok(scale_score(&converted))
    }

    async fn default_table_id(&self, exam_instance_id: i64) -> Result<i64, AppError> {
        self.tables
            .find_default()
            .await?
            .map(|table| table.id)
            .ok_or_else(|| {
                AppError::ConfigurationError(format!(
                    "Exam instance {} uses scale scoring but no conversion table applies",
                    exam_instance_id
                ))
            })
    }

    async fn load_lookup(&self, table_id: i64) -> Result<ConversionLookup, AppError> {
        if self.tables.find_table(table_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Conversion table {} not found",
                table_id
            )));
        }
        let details = self.tables.details(table_id).await?;
        Ok(ConversionLookup::new(&details))
    }
}
