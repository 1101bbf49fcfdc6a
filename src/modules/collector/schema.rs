use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::modules::market::model::TableStats;
use crate::modules::task::model::CollectorTask;
use crate::services::collector::CollectorStatus;

// =============================================================================
// SHARED
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

// =============================================================================
// STATUS
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub is_running: bool,
    pub current_task_id: Option<i64>,
    pub current_server_type: Option<i32>,
    pub current_product_type: Option<i32>,
    pub last_request_time: Option<DateTime<Utc>>,
    pub next_request_time: Option<DateTime<Utc>>,
    pub request_interval: u32,
    pub error_message: Option<String>,
    pub batch_id: Option<i64>,
    pub plan_len: usize,
    pub plan_cursor: usize,
    pub loop_alive: bool,
}

impl From<CollectorStatus> for StatusResponse {
    fn from(s: CollectorStatus) -> Self {
        Self {
            is_running: s.is_running,
            current_task_id: s.active_task.map(|t| t.task_id),
            current_server_type: s.active_task.map(|t| t.server_type),
            current_product_type: s.active_task.map(|t| t.product_type),
            last_request_time: s.last_request_time,
            next_request_time: s.next_request_time,
            request_interval: s.interval_seconds,
            error_message: s.error_message,
            batch_id: s.batch_id,
            plan_len: s.plan_len,
            plan_cursor: s.plan_cursor,
            loop_alive: s.loop_alive,
        }
    }
}

// =============================================================================
// START / STOP
// =============================================================================

#[derive(Debug, Deserialize, Validate, Default)]
pub struct StopRequest {
    #[validate(length(max = 200))]
    pub reason: Option<String>,
}

// Single-switch form used by the admin panel
#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub is_running: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub status: String,
    pub already_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_len: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopResponse {
    pub status: String,
    pub already_stopped: bool,
}

// =============================================================================
// INTERVAL
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateIntervalRequest {
    #[validate(range(min = 1, max = 3600, message = "Request interval must be between 1 and 3600 seconds"))]
    pub request_interval: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateIntervalResponse {
    pub status: String,
    pub request_interval: u32,
}

// =============================================================================
// TASK OVERVIEW
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct TasksResponse {
    pub tasks: Vec<CollectorTask>,
    /// Keyed by market table name.
    pub table_stats: BTreeMap<String, TableStats>,
}
