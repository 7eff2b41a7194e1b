// tests/reconciler_tests.rs

mod common;

use common::{answers, seed_raw_exam, spawn_state};
use exam_scoring::{
    models::{
        exam::InitialScore,
        result_record::{PendingSubmission, ResultFilter, ResultStatus, ScoreSummary},
    },
    queue::QueueOptions,
    store::ResultStore,
};

#[tokio::test]
async fn requeues_only_pending_records() {
    // Arrange: records as a crashed process would have left them
    let (store, state) = spawn_state(QueueOptions::default());
    seed_raw_exam(&store, 1, Some(InitialScore::Number(100.0))).await;

    for user in 1..=3 {
        store.insert_answers(user, 1, answers(10, user as usize, 0)).await;
        store
            .create_pending(&PendingSubmission::now(user, 1))
            .await
            .unwrap();
    }

    let completed = ScoreSummary {
        total_questions: 1,
        correct_count: 1,
        wrong_count: 0,
        score: 77,
    };
    store.save_completed(4, 1, &completed).await.unwrap();
    let failed = store
        .create_pending(&PendingSubmission::now(5, 1))
        .await
        .unwrap();
    store.mark_failed(failed, "earlier failure").await.unwrap();

    // Act
    let requeued = state.reconciler().run().await;
    state.queue.wait_idle().await;

    // Assert
    assert_eq!(requeued, 3);
    assert_eq!(state.queue.stats().enqueued, 3);

    for user in 1..=3 {
        let record = store.find(user, 1).await.unwrap().unwrap();
        assert_eq!(record.status, ResultStatus::Completed);
        assert_eq!(record.score, 100 + user);
    }

    let untouched = store.find(4, 1).await.unwrap().unwrap();
    assert_eq!(untouched.score, 77);
    assert_eq!(untouched.status, ResultStatus::Completed);

    let still_failed = store.find_by_id(failed).await.unwrap().unwrap();
    assert_eq!(still_failed.status, ResultStatus::Failed);
    assert_eq!(still_failed.failure_reason.as_deref(), Some("earlier failure"));
}

#[tokio::test]
async fn nothing_pending_enqueues_nothing() {
    let (_store, state) = spawn_state(QueueOptions::serial());

    assert_eq!(state.reconciler().run().await, 0);
    assert_eq!(state.queue.stats().enqueued, 0);
}

#[tokio::test]
async fn scan_failure_does_not_abort_startup() {
    let (store, state) = spawn_state(QueueOptions::serial());
    store
        .create_pending(&PendingSubmission::now(1, 1))
        .await
        .unwrap();
    store.set_unavailable(true);

    let requeued = state.reconciler().run().await;

    assert_eq!(requeued, 0);
    assert_eq!(state.queue.stats().enqueued, 0);

    store.set_unavailable(false);
    let pending = store.list(&ResultFilter::pending()).await.unwrap();
    assert_eq!(pending.len(), 1);
}
