use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::interface::{Result, TaskError, TaskRegistry};
use super::model::{BatchCreateOutcome, CollectorTask, TaskKey};
use crate::modules::market::MarketRepository;

#[derive(Default)]
struct Inner {
    next_id: i64,
    tasks: Vec<CollectorTask>,
}

/// Task registry held in process memory. Provisions tables through the
/// supplied market repository exactly like the MySQL registry.
pub struct InMemoryTaskRegistry {
    inner: Mutex<Inner>,
    markets: Arc<dyn MarketRepository>,
    delete_delay: Mutex<Option<Duration>>,
}

impl InMemoryTaskRegistry {
    pub fn new(markets: Arc<dyn MarketRepository>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                tasks: Vec::new(),
            }),
            markets,
            delete_delay: Mutex::new(None),
        }
    }

    /// Every subsequent `delete` sleeps this long before removing the task.
    pub fn delay_deletes(&self, delay: Option<Duration>) {
        *self.delete_delay.lock().unwrap() = delay;
    }

    fn insert(&self, key: TaskKey) -> Result<CollectorTask> {
        let mut inner = self.inner.lock().unwrap();
        if inner.tasks.iter().any(|t| t.key() == key) {
            return Err(TaskError::Duplicate(key));
        }

        let now = Utc::now();
        let task = CollectorTask {
            id: inner.next_id,
            server_type: key.server_type,
            product_type: key.product_type,
            created_at: now,
            updated_at: now,
        };
        inner.next_id += 1;
        inner.tasks.push(task.clone());
        Ok(task)
    }
}

#[async_trait]
impl TaskRegistry for InMemoryTaskRegistry {
    async fn list(&self) -> Result<Vec<CollectorTask>> {
        let mut tasks = self.inner.lock().unwrap().tasks.clone();
        tasks.sort_by_key(CollectorTask::key);
        Ok(tasks)
    }

    async fn find(&self, key: TaskKey) -> Result<Option<CollectorTask>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.tasks.iter().find(|t| t.key() == key).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<CollectorTask>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn create(&self, key: TaskKey) -> Result<CollectorTask> {
        if self.find(key).await?.is_some() {
            return Err(TaskError::Duplicate(key));
        }
        self.markets.ensure_table(key).await?;
        self.insert(key)
    }

    async fn create_many(&self, keys: &[TaskKey]) -> Result<BatchCreateOutcome> {
        let existing: HashSet<TaskKey> = self.list().await?.iter().map(CollectorTask::key).collect();
        let mut outcome = BatchCreateOutcome::default();
        let mut seen = HashSet::new();

        for key in keys {
            if existing.contains(key) || !seen.insert(*key) {
                outcome.skipped.push(*key);
                continue;
            }
            self.markets.ensure_table(*key).await?;
            outcome.created.push(*key);
        }

        for key in &outcome.created {
            self.insert(*key)?;
        }
        Ok(outcome)
    }

    async fn delete(&self, id: i64) -> Result<CollectorTask> {
        let delay = *self.delete_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.inner.lock().unwrap();
        let pos = inner
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(TaskError::NotFound)?;
        Ok(inner.tasks.remove(pos))
    }

    async fn delete_all(&self) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let count = inner.tasks.len() as u64;
        inner.tasks.clear();
        Ok(count)
    }
}
