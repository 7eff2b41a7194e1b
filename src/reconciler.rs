// src/reconciler.rs

use std::sync::Arc;

use crate::{
    models::result_record::ResultFilter,
    queue::{ScoringJob, ScoringQueue},
    store::ResultStore,
};

/// Re-enqueues result records left PENDING by a previous process.
///
/// Runs once at startup. It never changes a record's status itself and never
/// touches FAILED or COMPLETED records.
pub struct StartupReconciler {
    results: Arc<dyn ResultStore>,
    queue: Arc<ScoringQueue>,
}

impl StartupReconciler {
    pub fn new(results: Arc<dyn ResultStore>, queue: Arc<ScoringQueue>) -> Self {
        Self { results, queue }
    }

    /// Returns how many jobs were re-enqueued. A failed scan is logged and
    /// reported as zero so startup can continue.
    pub async fn run(&self) -> usize {
        let pending = match self.results.list(&ResultFilter::pending()).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(
                    "Startup reconciliation skipped, could not list pending results: {}",
                    e
                );
                return 0;
            }
        };

        for record in &pending {
            self.queue.enqueue(ScoringJob::from(record));
        }

        if pending.is_empty() {
            tracing::info!("Startup reconciliation found no pending results");
        } else {
            tracing::info!(
                count = pending.len(),
                "Re-enqueued pending results left by a previous run"
            );
        }
        pending.len()
    }
}
