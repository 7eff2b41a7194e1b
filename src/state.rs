// src/state.rs

use std::sync::Arc;

use crate::{
    config::Config,
    queue::{QueueOptions, ScoringQueue},
    reconciler::StartupReconciler,
    scoring::{CategoryResolver, ScoreCalculator},
    service::ScoringService,
    store::{ConversionStore, ExamSource, ResultStore},
};

/// Composition root: owns the queue and hands out the pieces wired to the
/// same stores.
#[derive(Clone)]
pub struct AppState {
    pub results: Arc<dyn ResultStore>,
    pub tables: Arc<dyn ConversionStore>,
    pub calculator: Arc<ScoreCalculator>,
    pub queue: Arc<ScoringQueue>,
    pub service: ScoringService,
}

impl AppState {
    /// Wires every component to stores implementing all three seams.
    /// Must be called from within a Tokio runtime (starts the queue).
    pub fn build<S>(store: Arc<S>, categories: CategoryResolver, options: QueueOptions) -> Self
    where
        S: ResultStore + ConversionStore + ExamSource + 'static,
    {
        let results: Arc<dyn ResultStore> = store.clone();
        let tables: Arc<dyn ConversionStore> = store.clone();
        let exams: Arc<dyn ExamSource> = store;

        let calculator = Arc::new(ScoreCalculator::new(
            exams,
            tables.clone(),
            results.clone(),
            categories,
        ));
        let queue = Arc::new(ScoringQueue::start(
            calculator.clone(),
            results.clone(),
            options,
        ));
        let service = ScoringService::new(results.clone(), calculator.clone(), queue.clone());

        Self {
            results,
            tables,
            calculator,
            queue,
            service,
        }
    }

    pub fn from_config<S>(store: Arc<S>, config: &Config) -> Self
    where
        S: ResultStore + ConversionStore + ExamSource + 'static,
    {
        Self::build(
            store,
            CategoryResolver::from_config(config),
            QueueOptions::from_config(config),
        )
    }

    pub fn reconciler(&self) -> StartupReconciler {
        StartupReconciler::new(self.results.clone(), self.queue.clone())
    }
}
