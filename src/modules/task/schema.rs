use serde::{Deserialize, Serialize};
use validator::Validate;

use super::model::{BatchCreateOutcome, CollectorTask, TaskKey};

// =============================================================================
// CREATE
// =============================================================================

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(range(min = 0, message = "server_type must not be negative"))]
    pub server_type: i32,
    #[validate(range(min = 1, message = "product_type must be positive"))]
    pub product_type: i32,
}

impl CreateTaskRequest {
    pub fn key(&self) -> TaskKey {
        TaskKey::new(self.server_type, self.product_type)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTaskResponse {
    pub status: String,
    pub task: CollectorTask,
}

// =============================================================================
// BATCH CREATE
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct BatchCreateRequest {
    #[validate(
        length(min = 1, max = 1000, message = "tasks must contain between 1 and 1000 entries"),
        nested
    )]
    pub tasks: Vec<CreateTaskRequest>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchCreateResponse {
    pub status: String,
    pub message: String,
    pub created_tasks: Vec<TaskKey>,
    pub skipped_tasks: Vec<TaskKey>,
    pub created_count: usize,
}

impl From<BatchCreateOutcome> for BatchCreateResponse {
    fn from(outcome: BatchCreateOutcome) -> Self {
        Self {
            status: "success".to_string(),
            message: format!("Created {} tasks", outcome.created.len()),
            created_count: outcome.created.len(),
            created_tasks: outcome.created,
            skipped_tasks: outcome.skipped,
        }
    }
}

// =============================================================================
// DELETE
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct DeleteTaskRequest {
    pub id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteTaskResponse {
    pub status: String,
    pub deleted: u64,
}
