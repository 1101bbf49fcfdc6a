use std::sync::Arc;

use chrono::Utc;
use serial_test::serial;
use sqlx::{MySql, Pool};

use market_collector::modules::collector::model::{ActiveTask, Dispatch};
use market_collector::modules::collector::{ControlStateCrud, ControlStateStore};
use market_collector::modules::market::{MarketCrud, MarketRepository};
use market_collector::modules::task::model::TaskKey;
use market_collector::modules::task::{TaskCrud, TaskError, TaskRegistry};
use market_collector::services::collector::{MarketMerger, SystemClock};

use crate::common::listing;

// =============================================================================
// INTEGRATION TESTS - MYSQL STORES
// Require TEST_DATABASE_URL; run with `cargo test -- --ignored`
// =============================================================================

const KEY: TaskKey = TaskKey {
    server_type: 90,
    product_type: 901,
};

async fn pool() -> Pool<MySql> {
    dotenvy::dotenv().ok();
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");

    let db = sqlx::mysql::MySqlPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .expect("Failed to run migrations");

    db
}

async fn cleanup(db: &Pool<MySql>) {
    sqlx::query("DELETE FROM collector_tasks").execute(db).await.ok();
    sqlx::query(&format!("DROP TABLE IF EXISTS {}", KEY.table_name()))
        .execute(db)
        .await
        .ok();
    let store = ControlStateCrud::new(db.clone());
    store.ensure_row().await.ok();
    store.mark_stopped(None).await.ok();
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_control_record_guards_loop_writes() {
    let db = pool().await;
    cleanup(&db).await;
    let store = ControlStateCrud::new(db.clone());

    store.begin_run(Some(&[KEY, TaskKey::new(91, 1)])).await.unwrap();
    let dispatch = Dispatch {
        task: ActiveTask {
            task_id: 7,
            server_type: KEY.server_type,
            product_type: KEY.product_type,
        },
        next_cursor: 1,
        requested_at: Utc::now(),
    };
    assert!(store.record_dispatch(&dispatch).await.unwrap());

    let state = store.load().await.unwrap();
    assert!(state.is_running);
    assert_eq!(state.plan.len(), 2);
    assert_eq!(state.plan_cursor, 1);
    assert_eq!(state.active_task.unwrap().task_id, 7);
    assert!(!store.set_interval(30).await.unwrap());

    store.mark_stopped(None).await.unwrap();
    assert!(!store.record_error("late write").await.unwrap());
    assert!(!store.advance_cursor(0).await.unwrap());

    let state = store.load().await.unwrap();
    assert!(!state.is_running);
    assert!(state.plan.is_empty());
    assert!(state.active_task.is_none());
    assert!(state.error_message.is_none());
    assert!(store.set_interval(60).await.unwrap());
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_task_create_provisions_market_table() {
    let db = pool().await;
    cleanup(&db).await;
    let markets: Arc<dyn MarketRepository> = Arc::new(MarketCrud::new(db.clone()));
    let tasks = TaskCrud::new(db.clone(), markets.clone());

    let task = tasks.create(KEY).await.unwrap();
    assert_eq!(task.key(), KEY);
    assert!(matches!(tasks.create(KEY).await, Err(TaskError::Duplicate(_))));

    let stats = markets.table_stats(KEY).await.unwrap();
    assert_eq!(stats.total_count, 0);

    let outcome = tasks.create_many(&[KEY, TaskKey::new(90, 902)]).await.unwrap();
    assert_eq!(outcome.created, vec![TaskKey::new(90, 902)]);
    assert_eq!(outcome.skipped, vec![KEY]);

    sqlx::query("DROP TABLE IF EXISTS market_90_902").execute(&db).await.ok();
    cleanup(&db).await;
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_merge_against_mysql() {
    let db = pool().await;
    cleanup(&db).await;
    let markets: Arc<dyn MarketRepository> = Arc::new(MarketCrud::new(db.clone()));
    markets.ensure_table(KEY).await.unwrap();
    let store: Arc<dyn ControlStateStore> = Arc::new(ControlStateCrud::new(db.clone()));
    let merger = MarketMerger::new(markets.clone(), store.clone(), Arc::new(SystemClock));

    merger.merge(KEY, &[listing(1, 10, 1000)]).await.unwrap();
    let summary = merger
        .merge(KEY, &[listing(1, 4, 1200), listing(2, 8, 900)])
        .await
        .unwrap();

    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.updated, 1);

    let updated = markets.find_record(KEY, 1).await.unwrap().unwrap();
    assert_eq!(updated.data_version, 2);
    assert_eq!(updated.quantity, 4);
    assert_eq!(updated.batch_id, summary.batch_id.unwrap());

    let stats = markets.table_stats(KEY).await.unwrap();
    assert_eq!(stats.total_count, 2);
    assert_eq!(stats.batch_count, 1);
    assert_eq!(stats.last_batch_count, 2);
    assert_eq!(store.load().await.unwrap().batch_id, summary.batch_id);

    cleanup(&db).await;
}
