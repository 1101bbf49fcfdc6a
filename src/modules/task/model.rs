use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A (server_type, product_type) pair. Identifies both a collector task and
/// its dedicated market table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    pub server_type: i32,
    pub product_type: i32,
}

impl TaskKey {
    pub fn new(server_type: i32, product_type: i32) -> Self {
        Self {
            server_type,
            product_type,
        }
    }

    /// Physical table holding this pair's listings.
    pub fn table_name(&self) -> String {
        format!("market_{}_{}", self.server_type, self.product_type)
    }
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.server_type, self.product_type)
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct CollectorTask {
    pub id: i64,
    pub server_type: i32,
    pub product_type: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CollectorTask {
    pub fn key(&self) -> TaskKey {
        TaskKey::new(self.server_type, self.product_type)
    }
}

/// Result of a batch create: pairs that were created and pairs skipped
/// because they already existed.
#[derive(Debug, Clone, Default)]
pub struct BatchCreateOutcome {
    pub created: Vec<TaskKey>,
    pub skipped: Vec<TaskKey>,
}
