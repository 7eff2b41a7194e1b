// tests/queue_tests.rs

mod common;

use std::time::Duration;

use tokio::time::Instant;

use common::{answers, seed_raw_exam, spawn_state};
use exam_scoring::{
    models::result_record::{PendingSubmission, ResultStatus},
    queue::{QueueOptions, ScoringJob},
    store::ResultStore,
};

#[tokio::test]
async fn failed_job_marks_record_failed_and_queue_keeps_going() {
    // Arrange: exam 1 exists, exam 404 does not
    let (store, state) = spawn_state(QueueOptions::serial());
    seed_raw_exam(&store, 1, None).await;
    store.insert_answers(7, 1, answers(10, 1, 1)).await;

    // Act
    let broken = state
        .service
        .submit(PendingSubmission::now(7, 404))
        .await
        .unwrap();
    let healthy = state
        .service
        .submit(PendingSubmission::now(7, 1))
        .await
        .unwrap();
    state.queue.wait_idle().await;

    // Assert
    let broken = store.find_by_id(broken).await.unwrap().unwrap();
    assert_eq!(broken.status, ResultStatus::Failed);
    assert!(broken
        .failure_reason
        .as_deref()
        .is_some_and(|r| r.contains("not found")));

    let healthy = store.find_by_id(healthy).await.unwrap().unwrap();
    assert_eq!(healthy.status, ResultStatus::Completed);
    assert_eq!(healthy.score, 1);

    let stats = state.queue.stats();
    assert_eq!((stats.enqueued, stats.completed, stats.failed), (2, 1, 1));
    assert_eq!(stats.outstanding, 0);
}

#[tokio::test]
async fn storage_write_failure_marks_record_failed() {
    let (store, state) = spawn_state(QueueOptions::serial());
    seed_raw_exam(&store, 1, None).await;
    store.insert_answers(7, 1, answers(10, 2, 0)).await;
    store.set_fail_completions(true);

    let record_id = state
        .service
        .submit(PendingSubmission::now(7, 1))
        .await
        .unwrap();
    state.queue.wait_idle().await;

    let record = store.find_by_id(record_id).await.unwrap().unwrap();
    assert_eq!(record.status, ResultStatus::Failed);
    // Numbers stay at the placeholder values
    assert_eq!(record.score, 0);
}

#[tokio::test]
async fn failed_jobs_are_not_retried_by_the_queue() {
    let (store, state) = spawn_state(QueueOptions::serial());

    state
        .service
        .submit(PendingSubmission::now(7, 404))
        .await
        .unwrap();
    state.queue.wait_idle().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let stats = state.queue.stats();
    assert_eq!(stats.enqueued, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(
        store.find(7, 404).await.unwrap().unwrap().status,
        ResultStatus::Failed
    );
}

#[tokio::test(start_paused = true)]
async fn enqueue_returns_immediately_when_saturated() {
    let (store, state) = spawn_state(QueueOptions::serial());
    seed_raw_exam(&store, 1, None).await;
    store.set_read_delay(Duration::from_millis(20));

    let mut record_ids = Vec::new();
    for user in 1..=10 {
        store.insert_answers(user, 1, answers(10, 1, 0)).await;
        record_ids.push(
            store
                .create_pending(&PendingSubmission::now(user, 1))
                .await
                .unwrap(),
        );
    }

    let started = Instant::now();
    for (user, record_id) in (1..=10).zip(&record_ids) {
        state.queue.enqueue(ScoringJob {
            user_id: user,
            exam_instance_id: 1,
            result_record_id: *record_id,
        });
    }
    // With the clock paused, waiting on even one job would move it by 20ms
    assert!(started.elapsed() < Duration::from_millis(20));

    state.queue.wait_idle().await;
    for record_id in record_ids {
        let record = store.find_by_id(record_id).await.unwrap().unwrap();
        assert_eq!(record.status, ResultStatus::Completed);
    }
}

#[tokio::test(start_paused = true)]
async fn concurrency_is_bounded() {
    let (store, state) = spawn_state(QueueOptions {
        concurrency: 2,
        job_timeout: None,
    });
    seed_raw_exam(&store, 1, None).await;
    store.set_read_delay(Duration::from_millis(30));

    for user in 1..=8 {
        store.insert_answers(user, 1, answers(10, 1, 0)).await;
        state
            .service
            .submit(PendingSubmission::now(user, 1))
            .await
            .unwrap();
    }
    state.queue.wait_idle().await;

    let peak = store.max_reads_in_flight();
    assert!(peak <= 2, "peak concurrency was {}", peak);
    assert!(peak >= 1);
    assert_eq!(state.queue.stats().completed, 8);
}

#[tokio::test(start_paused = true)]
async fn timed_out_job_is_marked_failed() {
    let (store, state) = spawn_state(QueueOptions {
        concurrency: 1,
        job_timeout: Some(Duration::from_millis(20)),
    });
    seed_raw_exam(&store, 1, None).await;
    store.insert_answers(7, 1, answers(10, 1, 0)).await;
    store.set_read_delay(Duration::from_millis(500));

    let record_id = state
        .service
        .submit(PendingSubmission::now(7, 1))
        .await
        .unwrap();
    state.queue.wait_idle().await;

    let record = store.find_by_id(record_id).await.unwrap().unwrap();
    assert_eq!(record.status, ResultStatus::Failed);
    assert!(record
        .failure_reason
        .as_deref()
        .is_some_and(|r| r.contains("timed out")));
    // The aborted read did not leak its in-flight slot
    assert_eq!(store.reads_in_flight(), 0);
}

#[tokio::test]
async fn shutdown_drains_and_drops_later_jobs() {
    let (store, state) = spawn_state(QueueOptions::serial());
    seed_raw_exam(&store, 1, None).await;
    store.insert_answers(1, 1, answers(10, 1, 0)).await;
    store.insert_answers(2, 1, answers(10, 1, 0)).await;

    let drained = state
        .service
        .submit(PendingSubmission::now(1, 1))
        .await
        .unwrap();
    state.queue.shutdown().await;

    let late = state
        .service
        .submit(PendingSubmission::now(2, 1))
        .await
        .unwrap();

    assert_eq!(
        store.find_by_id(drained).await.unwrap().unwrap().status,
        ResultStatus::Completed
    );
    // Left for the next startup reconciliation
    assert_eq!(
        store.find_by_id(late).await.unwrap().unwrap().status,
        ResultStatus::Pending
    );
    assert_eq!(state.queue.stats().enqueued, 1);
}

#[tokio::test]
async fn serial_queue_completes_jobs_in_submission_order() {
    let (store, state) = spawn_state(QueueOptions::serial());
    seed_raw_exam(&store, 1, None).await;

    let order = [3, 1, 5, 2, 4];
    for user in order {
        store.insert_answers(user, 1, answers(10, 1, 0)).await;
        state
            .service
            .submit(PendingSubmission::now(user, 1))
            .await
            .unwrap();
    }
    state.queue.wait_idle().await;

    let expected: Vec<(i64, i64)> = order.iter().map(|&user| (user, 1)).collect();
    assert_eq!(store.completion_log().await, expected);
}

#[tokio::test]
async fn panicking_job_is_marked_failed_and_pool_survives() {
    // Arrange: reads for user 7 panic, everyone else scores normally
    let (store, state) = spawn_state(QueueOptions::default());
    seed_raw_exam(&store, 1, None).await;
    for user in 7..=10 {
        store.insert_answers(user, 1, answers(10, 2, 0)).await;
    }
    store.set_panic_on_read(Some(7));

    // Act
    let panicked = state
        .service
        .submit(PendingSubmission::now(7, 1))
        .await
        .unwrap();
    for user in 8..=9 {
        state
            .service
            .submit(PendingSubmission::now(user, 1))
            .await
            .unwrap();
    }
    state.queue.wait_idle().await;

    // Assert
    let record = store.find_by_id(panicked).await.unwrap().unwrap();
    assert_eq!(record.status, ResultStatus::Failed);
    assert!(record
        .failure_reason
        .as_deref()
        .is_some_and(|r| r.starts_with("internal error: scoring task aborted")));
    assert_eq!(store.reads_in_flight(), 0);

    for user in 8..=9 {
        let record = store.find(user, 1).await.unwrap().unwrap();
        assert_eq!(record.status, ResultStatus::Completed);
        assert_eq!(record.score, 2);
    }

    // Workers are still there for later submissions
    state
        .service
        .submit(PendingSubmission::now(10, 1))
        .await
        .unwrap();
    state.queue.wait_idle().await;
    assert_eq!(
        store.find(10, 1).await.unwrap().unwrap().status,
        ResultStatus::Completed
    );

    let stats = state.queue.stats();
    assert_eq!((stats.completed, stats.failed), (3, 1));
}

#[tokio::test(start_paused = true)]
async fn concurrent_calculations_of_one_pair_are_serialized() {
    let (store, state) = spawn_state(QueueOptions::serial());
    seed_raw_exam(&store, 1, None).await;
    for user in 7..=9 {
        store.insert_answers(user, 1, answers(10, 1, 0)).await;
    }
    store.set_read_delay(Duration::from_millis(50));

    let (first, second, third) = tokio::join!(
        state.service.recalculate(7, 1),
        state.service.recalculate(7, 1),
        state.calculator.calculate(7, 1),
    );
    let ids = [first.unwrap().id, second.unwrap().id, third.unwrap().id];
    assert!(ids.iter().all(|&id| id == ids[0]));
    assert_eq!(store.max_reads_in_flight(), 1);

    // Different pairs still overlap
    let (a, b) = tokio::join!(
        state.service.recalculate(8, 1),
        state.service.recalculate(9, 1),
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(store.max_reads_in_flight(), 2);
}

#[tokio::test(start_paused = true)]
async fn failure_write_finishes_before_a_waiting_recalculation_runs() {
    // Arrange: the queued job times out while a direct recalculation waits
    let (store, state) = spawn_state(QueueOptions {
        concurrency: 1,
        job_timeout: Some(Duration::from_millis(50)),
    });
    seed_raw_exam(&store, 1, None).await;
    store.insert_answers(7, 1, answers(10, 3, 0)).await;
    store.set_read_delay(Duration::from_millis(200));

    let record_id = state
        .service
        .submit(PendingSubmission::now(7, 1))
        .await
        .unwrap();
    // Let the job take the pair
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Act
    let recalculated = state.service.recalculate(7, 1).await.unwrap();
    state.queue.wait_idle().await;

    // Assert: the admin result is the last word, not the job's FAILED mark
    assert_eq!(recalculated.id, record_id);
    let record = store.find_by_id(record_id).await.unwrap().unwrap();
    assert_eq!(record.status, ResultStatus::Completed);
    assert_eq!(record.failure_reason, None);
    assert_eq!(record.score, 3);
    assert_eq!(state.queue.stats().failed, 1);
    assert_eq!(store.completion_log().await, vec![(7, 1)]);
}
