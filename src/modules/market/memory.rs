use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::interface::{MarketError, MarketRepository, Result};
use super::model::{MarketRecord, MergeBatch, TableStats};
use crate::modules::task::model::TaskKey;

#[derive(Default)]
struct Table {
    rows: BTreeMap<i64, MarketRecord>,
    last_update: Option<chrono::DateTime<Utc>>,
}

/// Process-local market storage with the same batch semantics as the MySQL
/// tables: a batch either lands completely or not at all.
#[derive(Default)]
pub struct InMemoryMarketRepository {
    tables: Mutex<HashMap<TaskKey, Table>>,
    fail_writes: Mutex<Option<String>>,
}

impl InMemoryMarketRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `apply_batch` fail with `message` (None clears it).
    pub fn fail_writes(&self, message: Option<&str>) {
        *self.fail_writes.lock().unwrap() = message.map(str::to_string);
    }

    pub fn records(&self, key: TaskKey) -> Vec<MarketRecord> {
        self.tables
            .lock()
            .unwrap()
            .get(&key)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_table(&self, key: TaskKey) -> bool {
        self.tables.lock().unwrap().contains_key(&key)
    }
}

#[async_trait]
impl MarketRepository for InMemoryMarketRepository {
    async fn ensure_table(&self, key: TaskKey) -> Result<()> {
        self.tables.lock().unwrap().entry(key).or_default();
        Ok(())
    }

    async fn existing_versions(&self, key: TaskKey, market_ids: &[i64]) -> Result<HashMap<i64, i32>> {
        let tables = self.tables.lock().unwrap();
        let table = tables
            .get(&key)
            .ok_or_else(|| MarketError::MissingTable(key.table_name()))?;

        Ok(market_ids
            .iter()
            .filter_map(|id| table.rows.get(id).map(|r| (*id, r.data_version)))
            .collect())
    }

    async fn apply_batch(&self, key: TaskKey, batch: &MergeBatch) -> Result<()> {
        if let Some(message) = self.fail_writes.lock().unwrap().clone() {
            return Err(MarketError::Database(sqlx::Error::Protocol(message)));
        }

        let mut tables = self.tables.lock().unwrap();
        let table = tables
            .get_mut(&key)
            .ok_or_else(|| MarketError::MissingTable(key.table_name()))?;

        // Validate before touching anything so a rejected batch leaves no trace.
        for record in &batch.inserts {
            if table.rows.contains_key(&record.market_id) {
                return Err(MarketError::DuplicateMarketId(record.market_id));
            }
        }

        for update in &batch.updates {
            match table.rows.get_mut(&update.market_id) {
                Some(existing) => existing.apply_update(update),
                None => {
                    table.rows.insert(update.market_id, update.clone());
                }
            }
        }
        for record in &batch.inserts {
            table.rows.insert(record.market_id, record.clone());
        }
        table.last_update = Some(Utc::now());

        Ok(())
    }

    async fn find_record(&self, key: TaskKey, market_id: i64) -> Result<Option<MarketRecord>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.get(&key).and_then(|t| t.rows.get(&market_id).cloned()))
    }

    async fn table_stats(&self, key: TaskKey) -> Result<TableStats> {
        let tables = self.tables.lock().unwrap();
        let table = tables
            .get(&key)
            .ok_or_else(|| MarketError::MissingTable(key.table_name()))?;

        let mut batches: Vec<i64> = table.rows.values().map(|r| r.batch_id).collect();
        batches.sort_unstable();
        batches.dedup();
        let last_batch = batches.last().copied();

        Ok(TableStats {
            total_count: table.rows.len() as i64,
            batch_count: batches.len() as i64,
            last_batch_count: table
                .rows
                .values()
                .filter(|r| Some(r.batch_id) == last_batch)
                .count() as i64,
            last_update_time: table.last_update,
        })
    }
}
