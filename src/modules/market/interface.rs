use std::collections::HashMap;

use async_trait::async_trait;

use super::model::{MarketRecord, MergeBatch, TableStats};
use crate::modules::task::model::TaskKey;

pub type Result<T> = std::result::Result<T, MarketError>;

/// Per-task listing storage, one table per (server, product) pair.
#[async_trait]
pub trait MarketRepository: Send + Sync {
    /// Creates the pair's table if it does not exist yet.
    async fn ensure_table(&self, key: TaskKey) -> Result<()>;

    /// Current `data_version` of every id in `market_ids` that is already
    /// stored, fetched with one query.
    async fn existing_versions(&self, key: TaskKey, market_ids: &[i64]) -> Result<HashMap<i64, i32>>;

    /// Applies all updates and inserts in a single transaction.
    async fn apply_batch(&self, key: TaskKey, batch: &MergeBatch) -> Result<()>;

    async fn find_record(&self, key: TaskKey, market_id: i64) -> Result<Option<MarketRecord>>;

    async fn table_stats(&self, key: TaskKey) -> Result<TableStats>;
}

#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    #[error("Market table {0} does not exist")]
    MissingTable(String),

    #[error("Duplicate market_id {0}")]
    DuplicateMarketId(i64),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
