use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{MySql, Pool};

use super::interface::{Result, TaskError, TaskRegistry};
use super::model::{BatchCreateOutcome, CollectorTask, TaskKey};
use crate::modules::market::MarketRepository;

pub struct TaskCrud {
    pool: Pool<MySql>,
    markets: Arc<dyn MarketRepository>,
}

impl TaskCrud {
    pub fn new(pool: Pool<MySql>, markets: Arc<dyn MarketRepository>) -> Self {
        Self { pool, markets }
    }
}

#[async_trait]
impl TaskRegistry for TaskCrud {
    async fn list(&self) -> Result<Vec<CollectorTask>> {
        let tasks = sqlx::query_as::<_, CollectorTask>(
            "SELECT * FROM collector_tasks ORDER BY server_type, product_type",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tasks)
    }

    async fn find(&self, key: TaskKey) -> Result<Option<CollectorTask>> {
        let task = sqlx::query_as::<_, CollectorTask>(
            "SELECT * FROM collector_tasks WHERE server_type = ? AND product_type = ?",
        )
        .bind(key.server_type)
        .bind(key.product_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(task)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<CollectorTask>> {
        let task = sqlx::query_as::<_, CollectorTask>("SELECT * FROM collector_tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(task)
    }

    async fn create(&self, key: TaskKey) -> Result<CollectorTask> {
        if self.find(key).await?.is_some() {
            return Err(TaskError::Duplicate(key));
        }

        self.markets.ensure_table(key).await?;

        let result = sqlx::query("INSERT INTO collector_tasks (server_type, product_type) VALUES (?, ?)")
            .bind(key.server_type)
            .bind(key.product_type)
            .execute(&self.pool)
            .await
            .map_err(|e| duplicate_or(e, key))?;

        self.find_by_id(result.last_insert_id() as i64)
            .await?
            .ok_or(TaskError::NotFound)
    }

    async fn create_many(&self, keys: &[TaskKey]) -> Result<BatchCreateOutcome> {
        let existing: HashSet<TaskKey> = self.list().await?.iter().map(CollectorTask::key).collect();
        let mut outcome = BatchCreateOutcome::default();
        let mut seen = HashSet::new();

        // Tables first: DDL commits implicitly in MySQL, so it cannot share
        // the transaction that registers the tasks.
        let mut pending = Vec::new();
        for key in keys {
            if existing.contains(key) || !seen.insert(*key) {
                tracing::info!(task = %key, "Task already exists, skipping");
                outcome.skipped.push(*key);
                continue;
            }
            self.markets.ensure_table(*key).await?;
            pending.push(*key);
        }

        let mut tx = self.pool.begin().await?;
        for key in &pending {
            sqlx::query("INSERT INTO collector_tasks (server_type, product_type) VALUES (?, ?)")
                .bind(key.server_type)
                .bind(key.product_type)
                .execute(&mut *tx)
                .await
                .map_err(|e| duplicate_or(e, *key))?;
        }
        tx.commit().await?;

        outcome.created = pending;
        Ok(outcome)
    }

    async fn delete(&self, id: i64) -> Result<CollectorTask> {
        let task = self.find_by_id(id).await?.ok_or(TaskError::NotFound)?;

        sqlx::query("DELETE FROM collector_tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(task)
    }

    async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM collector_tasks")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn duplicate_or(err: sqlx::Error, key: TaskKey) -> TaskError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => TaskError::Duplicate(key),
        _ => TaskError::Database(err),
    }
}
