use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::model::{ControlState, Dispatch};
use crate::modules::task::model::TaskKey;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage contract for the singleton control record.
///
/// Writes made by the running loop (`schedule_next`, `record_dispatch`,
/// `advance_cursor`, `record_error`) only apply while `is_running` is set and
/// return whether they did, so a concurrent stop always wins.
#[async_trait]
pub trait ControlStateStore: Send + Sync {
    async fn load(&self) -> Result<ControlState>;

    /// Sets `is_running` and clears the last error. A new plan, if given,
    /// replaces the current one and resets the cursor.
    async fn begin_run(&self, plan: Option<&[TaskKey]>) -> Result<()>;

    /// Clears run fields; `error` replaces the stored error message.
    async fn mark_stopped(&self, error: Option<&str>) -> Result<()>;

    async fn schedule_next(&self, at: DateTime<Utc>) -> Result<bool>;

    async fn record_dispatch(&self, dispatch: &Dispatch) -> Result<bool>;

    async fn advance_cursor(&self, cursor: usize) -> Result<bool>;

    async fn record_error(&self, message: &str) -> Result<bool>;

    async fn set_batch_id(&self, batch_id: i64) -> Result<()>;

    /// Applies only while stopped.
    async fn set_interval(&self, seconds: u32) -> Result<bool>;

    /// Drops plan, cursor, active task and error. Used after deleting all tasks.
    async fn clear_plan(&self) -> Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Control record is missing")]
    Missing,

    #[error("Stored plan is corrupt: {0}")]
    CorruptPlan(#[from] serde_json::Error),

    #[error("Control store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
