use async_trait::async_trait;

use super::model::{BatchCreateOutcome, CollectorTask, TaskKey};
use crate::modules::market::interface::MarketError;

pub type Result<T> = std::result::Result<T, TaskError>;

/// Durable list of (server, product) pairs the collector rotates through.
#[async_trait]
pub trait TaskRegistry: Send + Sync {
    /// All tasks ordered by (server_type, product_type).
    async fn list(&self) -> Result<Vec<CollectorTask>>;
    async fn find(&self, key: TaskKey) -> Result<Option<CollectorTask>>;
    async fn find_by_id(&self, id: i64) -> Result<Option<CollectorTask>>;
    /// Provisions the pair's market table, then registers the task.
    async fn create(&self, key: TaskKey) -> Result<CollectorTask>;
    /// All-or-nothing: existing pairs are skipped, any failure rolls back
    /// every task created by this call.
    async fn create_many(&self, keys: &[TaskKey]) -> Result<BatchCreateOutcome>;
    async fn delete(&self, id: i64) -> Result<CollectorTask>;
    async fn delete_all(&self) -> Result<u64>;
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task not found")]
    NotFound,

    #[error("Task {0} already exists")]
    Duplicate(TaskKey),

    #[error("Failed to provision market table: {0}")]
    Provision(#[from] MarketError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl TaskError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Duplicate(_) => StatusCode::BAD_REQUEST,
            Self::Provision(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
