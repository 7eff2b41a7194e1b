// src/queue/mod.rs
//
// In-process scoring job queue: a FIFO channel feeding a dispatcher that runs
// at most `concurrency` jobs at once.

pub mod job;

pub use job::{QueueStats, ScoringJob};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Notify, Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};

use crate::{
    config::{Config, DEFAULT_SCORING_CONCURRENCY},
    error::AppError,
    models::result_record::ResultRecord,
    scoring::ScoreCalculator,
    store::ResultStore,
};

#[derive(Debug, Clone, Copy)]
pub struct QueueOptions {
    /// Jobs allowed in flight at once. Values below 1 are treated as 1.
    pub concurrency: usize,
    /// Jobs running longer than this are aborted and marked failed.
    pub job_timeout: Option<Duration>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_SCORING_CONCURRENCY,
            job_timeout: None,
        }
    }
}

impl QueueOptions {
    /// One job at a time, in submission order.
    pub fn serial() -> Self {
        Self {
            concurrency: 1,
            job_timeout: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.scoring_concurrency,
            job_timeout: config.scoring_job_timeout,
        }
    }
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    outstanding: AtomicU64,
    idle: Notify,
}

impl Counters {
    fn finish_one(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Executes one job and settles its result record.
struct Worker {
    calculator: Arc<ScoreCalculator>,
    results: Arc<dyn ResultStore>,
    job_timeout: Option<Duration>,
    counters: Arc<Counters>,
}

impl Worker {
    async fn run(&self, job: ScoringJob) {
        tracing::debug!(
            record_id = job.result_record_id,
            user_id = job.user_id,
            exam_instance_id = job.exam_instance_id,
            "Scoring job started"
        );

        // Held through the failure write, so a recalculation of the same pair
        // cannot land between the failed attempt and its FAILED mark.
        let pair = self
            .calculator
            .lock_pair(job.user_id, job.exam_instance_id)
            .await;

        match self.execute(job).await {
            Ok(record) => {
                self.counters.completed.fetch_add(1, Ordering::SeqCst);
                tracing::info!(
                    record_id = record.id,
                    user_id = job.user_id,
                    exam_instance_id = job.exam_instance_id,
                    score = record.score,
                    "Scoring job completed"
                );
            }
            Err(err) => {
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                tracing::error!(
                    record_id = job.result_record_id,
                    user_id = job.user_id,
                    exam_instance_id = job.exam_instance_id,
                    transient = err.is_transient(),
                    "Scoring job failed: {}",
                    err
                );

                if let Err(mark_err) = self
                    .results
                    .mark_failed(job.result_record_id, &err.to_string())
                    .await
                {
                    // The record stays pending and is picked up on next start.
                    tracing::error!(
                        record_id = job.result_record_id,
                        "Failed to mark result record as failed: {}",
                        mark_err
                    );
                }
            }
        }

        drop(pair);
        self.counters.finish_one();
    }

    /// Runs the calculator in its own task so a panic or timeout surfaces as
    /// an error instead of taking the worker slot down. The caller holds the
    /// pair lock.
    async fn execute(&self, job: ScoringJob) -> Result<ResultRecord, AppError> {
        let calculator = self.calculator.clone();
        let mut handle = tokio::spawn(async move {
            calculator
                .calculate_locked(job.user_id, job.exam_instance_id)
                .await
        });

        let joined = match self.job_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    // The task must be gone before anything else writes the record.
                    match handle.await {
                        Ok(finished) => Ok(finished),
                        Err(_) => {
                            return Err(AppError::InternalServerError(format!(
                                "scoring job timed out after {:?}",
                                limit
                            )));
                        }
                    }
                }
            },
            None => handle.await,
        };

        joined.map_err(|e| AppError::InternalServerError(format!("scoring task aborted: {}", e)))?
    }
}

/// Bounded-concurrency background queue for scoring jobs.
///
/// `enqueue` never waits: jobs go onto an unbounded channel and are picked up
/// in FIFO order by a dispatcher task. Completion order may differ from
/// submission order when `concurrency > 1`. Failed jobs are not retried.
pub struct ScoringQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<ScoringJob>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
    concurrency: usize,
}

impl ScoringQueue {
    /// Spawns the dispatcher. Must be called from within a Tokio runtime.
    pub fn start(
        calculator: Arc<ScoreCalculator>,
        results: Arc<dyn ResultStore>,
        options: QueueOptions,
    ) -> Self {
        let concurrency = options.concurrency.max(1);
        let counters = Arc::new(Counters::default());
        let (sender, receiver) = mpsc::unbounded_channel();

        let worker = Arc::new(Worker {
            calculator,
            results,
            job_timeout: options.job_timeout,
            counters: counters.clone(),
        });
        let permits = Arc::new(Semaphore::new(concurrency));
        let dispatcher = tokio::spawn(dispatch(receiver, worker, permits));

        tracing::info!(concurrency, "Scoring queue started");

        Self {
            sender: Mutex::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
            counters,
            concurrency,
        }
    }

    /// Fire-and-forget. After `shutdown` the job is dropped with a warning and
    /// its record stays pending.
    pub fn enqueue(&self, job: ScoringJob) {
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = sender.as_ref() else {
            tracing::warn!(
                record_id = job.result_record_id,
                "Scoring queue is shut down, job dropped"
            );
            return;
        };

        self.counters.outstanding.fetch_add(1, Ordering::SeqCst);
        if sender.send(job).is_err() {
            self.counters.finish_one();
            tracing::warn!(
                record_id = job.result_record_id,
                "Scoring dispatcher has stopped, job dropped"
            );
            return;
        }

        self.counters.enqueued.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            record_id = job.result_record_id,
            user_id = job.user_id,
            exam_instance_id = job.exam_instance_id,
            "Scoring job enqueued"
        );
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.counters.enqueued.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            outstanding: self.counters.outstanding.load(Ordering::SeqCst),
        }
    }

    /// Resolves once every job enqueued so far has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.counters.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.counters.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stops accepting jobs and waits for queued and in-flight jobs to finish.
    pub async fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(handle) = dispatcher {
            if let Err(e) = handle.await {
                tracing::error!("Scoring dispatcher ended abnormally: {}", e);
            }
        }
    }
}

async fn dispatch(
    mut receiver: mpsc::UnboundedReceiver<ScoringJob>,
    worker: Arc<Worker>,
    permits: Arc<Semaphore>,
) {
    let mut in_flight = JoinSet::new();

    while let Some(job) = receiver.recv().await {
        // Waiting here keeps later jobs in the channel, preserving FIFO order.
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };

        let worker = worker.clone();
        in_flight.spawn(async move {
            let _permit = permit;
            worker.run(job).await;
        });

        while let Some(done) = in_flight.try_join_next() {
            if let Err(e) = done {
                tracing::error!("Scoring worker task aborted: {}", e);
            }
        }
    }

    while let Some(done) = in_flight.join_next().await {
        if let Err(e) = done {
            tracing::error!("Scoring worker task aborted: {}", e);
        }
    }

    tracing::info!("Scoring queue drained");
}
