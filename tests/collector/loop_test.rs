use std::time::Duration;

use market_collector::modules::task::model::TaskKey;
use market_collector::modules::task::TaskRegistry;

use crate::common::{listing, wait_until, TestContext};

// =============================================================================
// INTEGRATION TESTS - POLLING LOOP
// Paused tokio time drives the interval and backoff waits
// =============================================================================

const A: TaskKey = TaskKey {
    server_type: 1,
    product_type: 10,
};
const B: TaskKey = TaskKey {
    server_type: 2,
    product_type: 20,
};
const C: TaskKey = TaskKey {
    server_type: 3,
    product_type: 30,
};

#[tokio::test(start_paused = true)]
async fn test_interval_defers_second_fetch() {
    let ctx = TestContext::with_tasks(&[A]).await;
    assert_eq!(ctx.store.snapshot().interval_seconds, 60);

    ctx.engine.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(ctx.fetcher.calls().len(), 1, "first fetch is immediate");

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(ctx.fetcher.calls().len(), 1, "no fetch at t=30");
    let state = ctx.store.snapshot();
    let last = state.last_request_time.unwrap();
    assert_eq!(
        state.next_request_time,
        Some(last + chrono::Duration::seconds(60))
    );

    tokio::time::sleep(Duration::from_secs(31)).await;
    let times = ctx.fetcher.call_times();
    assert_eq!(times.len(), 2, "second fetch once the interval elapsed");
    assert!(times[1] - times[0] >= Duration::from_secs(60));

    ctx.engine.stop("test").await.unwrap();
    println!("✅ Interval honoured between fetches");
}

#[tokio::test(start_paused = true)]
async fn test_rotation_visits_every_task() {
    let ctx = TestContext::with_tasks(&[C, A, B]).await;
    ctx.engine.update_interval(1).await.unwrap();

    ctx.engine.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(8_500)).await;
    ctx.engine.stop("test").await.unwrap();

    let calls = ctx.fetcher.calls();
    assert!(calls.len() >= 9, "expected three rotations, got {}", calls.len());
    assert_eq!(&calls[..3], &[A, B, C]);
    for key in [A, B, C] {
        let visits = calls.iter().filter(|k| **k == key).count();
        assert!(visits >= calls.len() / 3);
    }

    let rotations = ctx.metrics.collector_rotations_total.get();
    assert_eq!(rotations as usize, calls.len() / 3);
    for key in [A, B, C] {
        assert_eq!(ctx.markets.records(key).len(), 1);
        assert!(ctx.markets.records(key)[0].data_version >= 3);
    }
}

#[tokio::test(start_paused = true)]
async fn test_cursor_persists_before_fetch_outcome() {
    let ctx = TestContext::with_tasks(&[A, B]).await;
    ctx.fetcher.fail_with_status(Some(503));

    ctx.engine.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let state = ctx.store.snapshot();
    assert_eq!(ctx.fetcher.calls(), vec![A]);
    assert_eq!(state.plan_cursor, 1, "cursor is not rolled back after a failure");
    assert_eq!(state.active_task.map(|t| t.key()), Some(A));
    assert!(state.error_message.unwrap().contains("503"));

    ctx.engine.stop("test").await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_error_cleared_by_next_successful_cycle() {
    let ctx = TestContext::with_tasks(&[A]).await;
    ctx.engine.update_interval(1).await.unwrap();
    ctx.fetcher.fail_with_status(Some(502));

    ctx.engine.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(ctx.engine.status().await.unwrap().error_message.is_some());
    assert!(ctx.engine.status().await.unwrap().loop_alive);

    ctx.fetcher.fail_with_status(None);
    tokio::time::sleep(Duration::from_secs(2)).await;

    let status = ctx.engine.status().await.unwrap();
    assert!(status.error_message.is_none());
    assert!(status.batch_id.is_some());
    assert_eq!(ctx.markets.records(A).len(), 1);

    ctx.engine.stop("test").await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_merge_failure_is_recorded_and_retried() {
    let ctx = TestContext::with_tasks(&[A]).await;
    ctx.engine.update_interval(1).await.unwrap();
    ctx.markets.fail_writes(Some("disk full"));

    ctx.engine.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let status = ctx.engine.status().await.unwrap();
    assert!(status.error_message.unwrap().contains("disk full"));
    assert!(status.loop_alive);
    assert!(ctx.markets.records(A).is_empty());

    ctx.markets.fail_writes(None);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(ctx.markets.records(A).len(), 1);

    ctx.engine.stop("test").await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_task_deleted_mid_fetch_does_not_break_rotation() {
    let ctx = TestContext::with_tasks(&[A, B, C]).await;
    ctx.engine.update_interval(1).await.unwrap();
    ctx.fetcher.hold(Some(B));

    ctx.engine.start().await.unwrap();
    assert!(wait_until(Duration::from_secs(5), || ctx.fetcher.calls().contains(&B)).await);
    assert_eq!(ctx.store.snapshot().active_task.map(|t| t.key()), Some(B));

    // Removed behind the engine's back while its fetch is in flight
    let task = ctx.task(B).await;
    ctx.tasks.delete(task.id).await.unwrap();
    ctx.fetcher.release();

    tokio::time::sleep(Duration::from_secs(8)).await;

    let calls = ctx.fetcher.calls();
    let b_calls = calls.iter().filter(|k| **k == B).count();
    assert_eq!(b_calls, 1, "deleted task is never fetched again");
    assert!(calls.iter().filter(|k| **k == C).count() >= 2);
    assert!(calls.iter().filter(|k| **k == A).count() >= 2);

    let status = ctx.engine.status().await.unwrap();
    assert!(status.is_running);
    assert!(status.loop_alive);
    assert!(status.error_message.is_none());

    let output = ctx.metrics.export().unwrap();
    assert!(output.contains("kind=\"configuration\""));

    ctx.engine.stop("test").await.unwrap();
    println!("✅ Rotation continued past the deleted task");
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_interval_wait() {
    let ctx = TestContext::with_tasks(&[A]).await;

    ctx.engine.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(ctx.fetcher.calls().len(), 1);

    ctx.engine.stop("test").await.unwrap();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(ctx.fetcher.calls().len(), 1);
    let state = ctx.store.snapshot();
    assert!(!state.is_running);
    assert!(state.next_request_time.is_none());
    assert!(!ctx.engine.status().await.unwrap().loop_alive);
}

#[tokio::test(start_paused = true)]
async fn test_panic_in_cycle_forces_stopped_state() {
    let ctx = TestContext::with_tasks(&[A]).await;
    ctx.fetcher.panic_on_fetch(true);

    ctx.engine.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = ctx.engine.status().await.unwrap();
    assert!(!status.is_running);
    assert!(!status.loop_alive);
    assert!(status.error_message.unwrap().contains("market API fake exploded"));
    assert!(ctx.store.snapshot().plan.is_empty());

    ctx.fetcher.panic_on_fetch(false);
    ctx.engine.start().await.unwrap();
    assert!(ctx.engine.status().await.unwrap().loop_alive);
    ctx.engine.stop("test").await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_fetched_listings_are_merged_with_versions() {
    let ctx = TestContext::with_tasks(&[A]).await;
    ctx.engine.update_interval(1).await.unwrap();
    ctx.fetcher.set_listings(A, vec![listing(1, 10, 1000)]);

    ctx.engine.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    ctx.fetcher
        .set_listings(A, vec![listing(1, 7, 1100), listing(2, 3, 900)]);
    tokio::time::sleep(Duration::from_secs(1)).await;
    ctx.engine.stop("test").await.unwrap();

    let records = ctx.markets.records(A);
    assert_eq!(records.len(), 2);
    let first = records.iter().find(|r| r.market_id == 1).unwrap();
    let second = records.iter().find(|r| r.market_id == 2).unwrap();
    assert_eq!(first.data_version, 2);
    assert_eq!(first.quantity, 7);
    assert_eq!(second.data_version, 1);
    assert_eq!(first.batch_id, second.batch_id);
}

#[tokio::test(start_paused = true)]
async fn test_loop_clears_run_fields_when_flag_drops_underneath() {
    let ctx = TestContext::with_tasks(&[A, B]).await;
    ctx.fetcher.hold(Some(A));
    ctx.fetcher.fail_with_status(Some(503));

    ctx.engine.start().await.unwrap();
    assert!(wait_until(Duration::from_secs(5), || ctx.fetcher.calls().contains(&A)).await);

    // Only the flag goes; plan and active task stay behind
    ctx.store.set_running_flag(false);
    let before = ctx.store.snapshot();
    assert_eq!(before.plan, vec![A, B]);
    assert!(before.active_task.is_some());

    // The failed fetch makes the loop attempt a guarded error write
    ctx.fetcher.release();
    assert!(wait_until(Duration::from_secs(5), || ctx.store.snapshot().plan.is_empty()).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let state = ctx.store.snapshot();
    assert!(!state.is_running);
    assert!(state.active_task.is_none());
    assert_eq!(state.plan_cursor, 0);
    assert!(state.next_request_time.is_none());
    assert!(state.error_message.is_none());
    assert!(!ctx.engine.status().await.unwrap().loop_alive);
    assert_eq!(ctx.fetcher.calls().len(), 1);
}
