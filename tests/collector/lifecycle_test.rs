use std::time::{Duration, Instant};

use market_collector::modules::collector::model::ControlState;
use market_collector::modules::task::model::TaskKey;
use market_collector::modules::task::TaskRegistry;
use market_collector::services::collector::{CollectorError, StartOutcome, StopOutcome};

use crate::common::{wait_until, TestContext};

// =============================================================================
// INTEGRATION TESTS - ENGINE LIFECYCLE
// start / stop / bootstrap against in-memory stores
// =============================================================================

const A: TaskKey = TaskKey {
    server_type: 1,
    product_type: 10,
};
const B: TaskKey = TaskKey {
    server_type: 2,
    product_type: 20,
};

#[tokio::test]
async fn test_stop_when_stopped_changes_nothing() {
    let ctx = TestContext::with_tasks(&[A]).await;
    let before = ctx.store.snapshot();
    let writes = ctx.store.writes();

    let outcome = ctx.engine.stop("test").await.unwrap();
    let again = ctx.engine.stop("test").await.unwrap();

    assert_eq!(outcome, StopOutcome::AlreadyStopped);
    assert_eq!(again, StopOutcome::AlreadyStopped);
    assert_eq!(ctx.store.writes(), writes);
    assert_eq!(ctx.store.snapshot(), before);
    assert_eq!(ctx.fetcher.resets(), 0);
    println!("✅ Stop on a stopped engine is a no-op");
}

#[tokio::test]
async fn test_start_without_tasks_is_rejected() {
    let ctx = TestContext::new().await;

    let result = ctx.engine.start().await;

    assert!(matches!(result, Err(CollectorError::NoTasks)));
    assert!(!ctx.store.snapshot().is_running);
    assert!(!ctx.engine.status().await.unwrap().loop_alive);
}

#[tokio::test]
async fn test_start_persists_sorted_plan_and_fetches() {
    let ctx = TestContext::with_tasks(&[B, A]).await;

    let outcome = ctx.engine.start().await.unwrap();
    assert_eq!(outcome, StartOutcome::Started { plan_len: 2 });

    assert!(wait_until(Duration::from_secs(2), || ctx.fetcher.completed() >= 1).await);
    let state = ctx.store.snapshot();
    assert!(state.is_running);
    assert_eq!(state.plan, vec![A, B]);
    assert_eq!(ctx.fetcher.calls()[0], A);

    ctx.engine.stop("test").await.unwrap();
}

#[tokio::test]
async fn test_second_start_leaves_plan_and_cursor_alone() {
    let ctx = TestContext::with_tasks(&[A, B]).await;
    ctx.fetcher.hang(true);

    ctx.engine.start().await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || !ctx.fetcher.calls().is_empty()).await);
    let before = ctx.store.snapshot();

    let outcome = ctx.engine.start().await.unwrap();

    assert_eq!(outcome, StartOutcome::AlreadyRunning);
    let after = ctx.store.snapshot();
    assert_eq!(after.plan, before.plan);
    assert_eq!(after.plan_cursor, before.plan_cursor);
    assert_eq!(ctx.fetcher.calls().len(), 1);

    ctx.engine.stop("test").await.unwrap();
    println!("✅ Second start did not respawn the loop");
}

#[tokio::test]
async fn test_stop_aborts_in_flight_fetch() {
    let ctx = TestContext::with_tasks(&[A]).await;
    ctx.fetcher.hang(true);

    ctx.engine.start().await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || !ctx.fetcher.calls().is_empty()).await);
    assert_eq!(ctx.store.snapshot().active_task.map(|t| t.key()), Some(A));

    let started = Instant::now();
    let outcome = ctx.engine.stop("operator").await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome, StopOutcome::Stopped);
    assert!(elapsed < Duration::from_millis(900), "stop took {:?}", elapsed);
    assert_eq!(ctx.fetcher.completed(), 0);
    assert_eq!(ctx.fetcher.resets(), 1);

    let state = ctx.store.snapshot();
    assert!(!state.is_running);
    assert!(state.plan.is_empty());
    assert_eq!(state.plan_cursor, 0);
    assert!(state.active_task.is_none());
    assert!(state.next_request_time.is_none());
    assert!(state.error_message.is_none());
    assert!(!ctx.engine.status().await.unwrap().loop_alive);
    println!("✅ In-flight fetch abandoned in {:?}", elapsed);
}

#[tokio::test]
async fn test_persisted_flag_matches_loop_across_restarts() {
    let ctx = TestContext::with_tasks(&[A, B]).await;

    for _ in 0..3 {
        ctx.engine.start().await.unwrap();
        let status = ctx.engine.status().await.unwrap();
        assert!(status.is_running);
        assert!(status.loop_alive);

        ctx.engine.stop("cycle").await.unwrap();
        let status = ctx.engine.status().await.unwrap();
        assert!(!status.is_running);
        assert!(!status.loop_alive);
    }
}

#[tokio::test]
async fn test_start_failure_rolls_back_to_stopped() {
    let ctx = TestContext::with_tasks(&[A]).await;
    ctx.store.fail_begin_run(Some("disk full"));

    let result = ctx.engine.start().await;

    assert!(matches!(result, Err(CollectorError::StartFailure(_))));
    let state = ctx.store.snapshot();
    assert!(!state.is_running);
    assert!(state.plan.is_empty());
    assert!(state.error_message.unwrap().contains("disk full"));
    assert!(!ctx.engine.status().await.unwrap().loop_alive);
    assert!(ctx.fetcher.calls().is_empty());

    ctx.store.fail_begin_run(None);
    assert!(ctx.engine.start().await.is_ok());
    assert!(ctx.store.snapshot().error_message.is_none());
    ctx.engine.stop("test").await.unwrap();
}

#[tokio::test]
async fn test_bootstrap_resumes_interrupted_run() {
    let state = ControlState {
        is_running: true,
        plan: vec![A, B],
        plan_cursor: 1,
        ..ControlState::default()
    };
    let ctx = TestContext::build(state, &[A, B]).await;

    assert!(wait_until(Duration::from_secs(2), || !ctx.fetcher.calls().is_empty()).await);
    assert_eq!(ctx.fetcher.calls()[0], B);
    assert!(ctx.engine.status().await.unwrap().loop_alive);

    ctx.engine.stop("test").await.unwrap();
    println!("✅ Resumed at the persisted cursor");
}

#[tokio::test]
async fn test_bootstrap_stops_run_without_plan() {
    let state = ControlState {
        is_running: true,
        ..ControlState::default()
    };
    let ctx = TestContext::build(state, &[A]).await;

    assert!(!ctx.store.snapshot().is_running);
    assert!(!ctx.engine.status().await.unwrap().loop_alive);
    assert!(ctx.fetcher.calls().is_empty());
}

// =============================================================================
// GUARDED OPERATIONS
// =============================================================================

#[tokio::test]
async fn test_interval_update_rules() {
    let ctx = TestContext::with_tasks(&[A]).await;

    assert!(matches!(
        ctx.engine.update_interval(0).await,
        Err(CollectorError::InvalidInterval(0))
    ));
    assert!(matches!(
        ctx.engine.update_interval(3601).await,
        Err(CollectorError::InvalidInterval(3601))
    ));
    assert_eq!(ctx.engine.update_interval(3600).await.unwrap(), 3600);
    assert_eq!(ctx.engine.update_interval(1).await.unwrap(), 1);

    ctx.fetcher.hang(true);
    ctx.engine.start().await.unwrap();
    assert!(matches!(
        ctx.engine.update_interval(30).await,
        Err(CollectorError::Running)
    ));
    assert_eq!(ctx.store.snapshot().interval_seconds, 1);

    ctx.engine.stop("test").await.unwrap();
    assert_eq!(ctx.engine.update_interval(30).await.unwrap(), 30);
}

#[tokio::test]
async fn test_deletes_refused_while_running() {
    let ctx = TestContext::with_tasks(&[A, B]).await;
    let task = ctx.task(A).await;
    ctx.fetcher.hang(true);
    ctx.engine.start().await.unwrap();

    assert!(matches!(
        ctx.engine.delete_task(task.id).await,
        Err(CollectorError::Running)
    ));
    assert!(matches!(
        ctx.engine.delete_all_tasks().await,
        Err(CollectorError::Running)
    ));
    assert_eq!(ctx.tasks.list().await.unwrap().len(), 2);

    ctx.engine.stop("test").await.unwrap();

    let deleted = ctx.engine.delete_task(task.id).await.unwrap();
    assert_eq!(deleted.key(), A);
    assert!(matches!(
        ctx.engine.delete_task(task.id).await,
        Err(CollectorError::NotFound)
    ));
    assert_eq!(ctx.engine.delete_all_tasks().await.unwrap(), 1);
    assert!(ctx.tasks.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_all_clears_plan() {
    let state = ControlState {
        plan: vec![A, B],
        plan_cursor: 1,
        error_message: Some("old".to_string()),
        ..ControlState::default()
    };
    let ctx = TestContext::build(state, &[A, B]).await;

    ctx.engine.delete_all_tasks().await.unwrap();

    let state = ctx.store.snapshot();
    assert!(state.plan.is_empty());
    assert_eq!(state.plan_cursor, 0);
    assert!(state.error_message.is_none());
}

#[tokio::test]
async fn test_delete_holds_off_concurrent_start() {
    let ctx = TestContext::with_tasks(&[A, B]).await;
    let task = ctx.task(A).await;
    ctx.tasks.delay_deletes(Some(Duration::from_millis(200)));

    let engine = ctx.engine.clone();
    let delete = tokio::spawn(async move { engine.delete_task(task.id).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = ctx.engine.start().await.unwrap();
    let deleted = delete.await.unwrap().unwrap();

    assert_eq!(deleted.key(), A);
    assert_eq!(started, StartOutcome::Started { plan_len: 1 });
    assert_eq!(ctx.store.snapshot().plan, vec![B]);
    assert!(ctx.tasks.find(A).await.unwrap().is_none());

    ctx.engine.stop("test").await.unwrap();
    println!("✅ Start waited for the delete and planned without it");
}

#[tokio::test]
async fn test_stop_failure_retries_into_stopped_state() {
    let ctx = TestContext::with_tasks(&[A]).await;
    ctx.fetcher.hang(true);
    ctx.engine.start().await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || !ctx.fetcher.calls().is_empty()).await);

    ctx.store.fail_mark_stopped(1);
    let result = ctx.engine.stop("test").await;

    assert!(matches!(result, Err(CollectorError::StopFailure(_))));
    let state = ctx.store.snapshot();
    assert!(!state.is_running);
    assert!(state.plan.is_empty());
    assert!(state.active_task.is_none());
    assert!(state
        .error_message
        .unwrap()
        .starts_with("Failed to stop collector"));
    assert!(!ctx.engine.status().await.unwrap().loop_alive);
    assert_eq!(
        ctx.engine.stop("again").await.unwrap(),
        StopOutcome::AlreadyStopped
    );
    println!("✅ Failed stop write still ends in a stopped record");
}
