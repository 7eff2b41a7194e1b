// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::Arc;

use exam_scoring::{
    AppState,
    models::{
        conversion::{NewConversionDetail, NewConversionTable},
        exam::{ExamInstance, InitialScore, ScoringPolicy, Section, SubmittedAnswer},
    },
    queue::QueueOptions,
    scoring::CategoryResolver,
    store::{ConversionStore, MemoryStore},
};

pub fn spawn_state(options: QueueOptions) -> (Arc<MemoryStore>, AppState) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::build(store.clone(), CategoryResolver::default(), options);
    (store, state)
}

/// `correct` right answers followed by `wrong` wrong ones, all in `section_id`.
pub fn answers(section_id: i64, correct: usize, wrong: usize) -> Vec<SubmittedAnswer> {
    (0..correct + wrong)
        .map(|i| SubmittedAnswer {
            question_id: (section_id * 1000) + i as i64,
            section_id,
            is_correct: i < correct,
        })
        .collect()
}

pub async fn seed_raw_exam(store: &MemoryStore, exam_id: i64, initial_score: Option<InitialScore>) {
    store
        .insert_exam(ExamInstance {
            id: exam_id,
            policy: ScoringPolicy::raw(initial_score),
            sections: vec![Section {
                id: exam_id * 10,
                category: "General".to_string(),
                conversion_table_id: None,
            }],
        })
        .await;
}

pub async fn seed_toefl_table(store: &MemoryStore) -> i64 {
    let mut details = Vec::new();
    for correct in 0..=5 {
        details.push(NewConversionDetail::new("listening", correct, 30 + correct * 4));
        details.push(NewConversionDetail::new("structure", correct, 28 + correct * 4));
        details.push(NewConversionDetail::new("reading", correct, 29 + correct * 4));
    }
    store
        .create_table(&NewConversionTable {
            name: "TOEFL ITP prediction".to_string(),
            description: Some("Short form".to_string()),
            is_default: true,
            details,
        })
        .await
        .expect("Failed to seed conversion table")
        .id
}
