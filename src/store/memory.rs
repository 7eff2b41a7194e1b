// src/store/memory.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    error::AppError,
    models::{
        conversion::{ConversionDetail, ConversionTable, NewConversionTable},
        exam::{ExamInstance, SubmittedAnswer},
        result_record::{
            PendingSubmission, ResultFilter, ResultRecord, ResultStatus, ScoreSummary,
        },
    },
    store::{ConversionStore, ExamSource, ResultStore},
};

#[derive(Default)]
struct State {
    exams: HashMap<i64, ExamInstance>,
    answers: HashMap<(i64, i64), Vec<SubmittedAnswer>>,
    tables: BTreeMap<i64, ConversionTable>,
    details: Vec<ConversionDetail>,
    results: BTreeMap<i64, ResultRecord>,
    /// (user, exam) of every successful `save_completed`, oldest first.
    completions: Vec<(i64, i64)>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process store implementing every storage seam.
///
/// Also carries failure switches and an artificial read delay so queue
/// behavior can be observed without a database.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    unavailable: AtomicBool,
    fail_completions: AtomicBool,
    read_delay_ms: AtomicUsize,
    /// Answer reads for this user panic; 0 disables.
    panic_user: AtomicI64,
    reads_in_flight: AtomicUsize,
    max_reads_in_flight: AtomicUsize,
}

/// Counts one answer read for as long as it lives, including a read that is
/// cancelled or unwinds.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> (Self, usize) {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        (Self(counter), now)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_exam(&self, exam: ExamInstance) {
        self.state.write().await.exams.insert(exam.id, exam);
    }

    pub async fn insert_answers(
        &self,
        user_id: i64,
        exam_instance_id: i64,
        answers: Vec<SubmittedAnswer>,
    ) {
        self.state
            .write()
            .await
            .answers
            .insert((user_id, exam_instance_id), answers);
    }

    /// Every operation fails with a storage error while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Only `save_completed` fails while set.
    pub fn set_fail_completions(&self, fail: bool) {
        self.fail_completions.store(fail, Ordering::SeqCst);
    }

    /// Delay applied to every `submitted_answers` read.
    pub fn set_read_delay(&self, delay: Duration) {
        self.read_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    /// Makes `submitted_answers` panic for `user_id`, simulating a bug in the
    /// scoring path. `None` turns it off.
    pub fn set_panic_on_read(&self, user_id: Option<i64>) {
        self.panic_user
            .store(user_id.unwrap_or(0), Ordering::SeqCst);
    }

    /// Answer reads currently running.
    pub fn reads_in_flight(&self) -> usize {
        self.reads_in_flight.load(Ordering::SeqCst)
    }

    /// (user, exam) pairs in the order their results were saved as completed.
    pub async fn completion_log(&self) -> Vec<(i64, i64)> {
        self.state.read().await.completions.clone()
    }

    /// Highest number of answer reads observed running at the same time.
    pub fn max_reads_in_flight(&self) -> usize {
        self.max_reads_in_flight.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::StorageError("store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn create_pending(&self, submission: &PendingSubmission) -> Result<i64, AppError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let now = Utc::now();

        let existing = state.results.values_mut().find(|r| {
            r.user_id == submission.user_id && r.exam_instance_id == submission.exam_instance_id
        });
        if let Some(record) = existing {
            record.status = ResultStatus::Pending;
            record.failure_reason = None;
            record.submitted_at = submission.submitted_at;
            record.updated_at = now;
            return Ok(record.id);
        }

        let id = state.next_id();
        state.results.insert(
            id,
            ResultRecord {
                id,
                user_id: submission.user_id,
                exam_instance_id: submission.exam_instance_id,
                total_questions: 0,
                correct_count: 0,
                wrong_count: 0,
                score: 0,
                status: ResultStatus::Pending,
                failure_reason: None,
                submitted_at: submission.submitted_at,
                completed_at: None,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn save_completed(
        &self,
        user_id: i64,
        exam_instance_id: i64,
        summary: &ScoreSummary,
    ) -> Result<ResultRecord, AppError> {
        self.check_available()?;
        if self.fail_completions.load(Ordering::SeqCst) {
            return Err(AppError::StorageError("write rejected".to_string()));
        }

        let mut state = self.state.write().await;
        let now = Utc::now();

        let existing = state
            .results
            .values()
            .find(|r| r.user_id == user_id && r.exam_instance_id == exam_instance_id)
            .map(|r| (r.id, r.submitted_at));
        let (id, submitted_at) = match existing {
            Some(found) => found,
            None => (state.next_id(), now),
        };

        let record = ResultRecord {
            id,
            user_id,
            exam_instance_id,
            total_questions: summary.total_questions,
            correct_count: summary.correct_count,
            wrong_count: summary.wrong_count,
            score: summary.score,
            status: ResultStatus::Completed,
            failure_reason: None,
            submitted_at,
            completed_at: Some(now),
            updated_at: now,
        };
        state.results.insert(id, record.clone());
        state.completions.push((user_id, exam_instance_id));
        Ok(record)
    }

    async fn mark_failed(&self, record_id: i64, reason: &str) -> Result<(), AppError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let record = state
            .results
            .get_mut(&record_id)
            .ok_or_else(|| AppError::NotFound(format!("Result record {} not found", record_id)))?;
        record.status = ResultStatus::Failed;
        record.failure_reason = Some(reason.to_string());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_pending(&self, record_id: i64) -> Result<(), AppError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let record = state
            .results
            .get_mut(&record_id)
            .ok_or_else(|| AppError::NotFound(format!("Result record {} not found", record_id)))?;
        record.status = ResultStatus::Pending;
        record.failure_reason = None;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn find(
        &self,
        user_id: i64,
        exam_instance_id: i64,
    ) -> Result<Option<ResultRecord>, AppError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .results
            .values()
            .find(|r| r.user_id == user_id && r.exam_instance_id == exam_instance_id)
            .cloned())
    }

    async fn find_by_id(&self, record_id: i64) -> Result<Option<ResultRecord>, AppError> {
        self.check_available()?;
        Ok(self.state.read().await.results.get(&record_id).cloned())
    }

    async fn list(&self, filter: &ResultFilter) -> Result<Vec<ResultRecord>, AppError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .results
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ConversionStore for MemoryStore {
    async fn create_table(&self, req: &NewConversionTable) -> Result<ConversionTable, AppError> {
        self.check_available()?;
        req.check()?;

        let mut state = self.state.write().await;
        if req.is_default {
            for table in state.tables.values_mut() {
                table.is_default = false;
            }
        }

        let id = state.next_id();
        let table = ConversionTable {
            id,
            name: req.name.clone(),
            description: req.description.clone(),
            is_default: req.is_default,
            created_at: Some(Utc::now()),
        };
        state.tables.insert(id, table.clone());

        for detail in &req.details {
            let detail_id = state.next_id();
            state.details.push(ConversionDetail {
                id: detail_id,
                table_id: id,
                section_category: detail.section_category.trim().to_string(),
                correct_count: detail.correct_count,
                converted_score: detail.converted_score,
            });
        }

        Ok(table)
    }

    async fn set_default(&self, table_id: i64) -> Result<(), AppError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if !state.tables.contains_key(&table_id) {
            return Err(AppError::NotFound(format!(
                "Conversion table {} not found",
                table_id
            )));
        }
        for table in state.tables.values_mut() {
            table.is_default = table.id == table_id;
        }
        Ok(())
    }

    async fn find_table(&self, table_id: i64) -> Result<Option<ConversionTable>, AppError> {
        self.check_available()?;
        Ok(self.state.read().await.tables.get(&table_id).cloned())
    }

    async fn find_default(&self) -> Result<Option<ConversionTable>, AppError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.tables.values().find(|t| t.is_default).cloned())
    }

    async fn list_tables(&self) -> Result<Vec<ConversionTable>, AppError> {
        self.check_available()?;
        Ok(self.state.read().await.tables.values().cloned().collect())
    }

    async fn details(&self, table_id: i64) -> Result<Vec<ConversionDetail>, AppError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .details
            .iter()
            .filter(|d| d.table_id == table_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ExamSource for MemoryStore {
    async fn find_exam(&self, exam_instance_id: i64) -> Result<Option<ExamInstance>, AppError> {
        self.check_available()?;
        Ok(self.state.read().await.exams.get(&exam_instance_id).cloned())
    }

    async fn submitted_answers(
        &self,
        user_id: i64,
        exam_instance_id: i64,
    ) -> Result<Vec<SubmittedAnswer>, AppError> {
        self.check_available()?;

        let (_in_flight, now) = InFlight::enter(&self.reads_in_flight);
        self.max_reads_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }

        if user_id != 0 && self.panic_user.load(Ordering::SeqCst) == user_id {
            panic!("answer read for user {} blew up", user_id);
        }

        let answers = self
            .state
            .read()
            .await
            .answers
            .get(&(user_id, exam_instance_id))
            .cloned()
            .unwrap_or_default();

        Ok(answers)
    }
}
