use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::config::collector::DEFAULT_INTERVAL_SECS;
use crate::modules::task::model::TaskKey;

/// Task currently being polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTask {
    pub task_id: i64,
    pub server_type: i32,
    pub product_type: i32,
}

impl ActiveTask {
    pub fn key(&self) -> TaskKey {
        TaskKey::new(self.server_type, self.product_type)
    }
}

/// The persisted control record. Sole source of truth for whether the
/// collector should be running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    pub is_running: bool,
    pub plan: Vec<TaskKey>,
    pub plan_cursor: usize,
    pub interval_seconds: u32,
    pub active_task: Option<ActiveTask>,
    pub last_request_time: Option<DateTime<Utc>>,
    pub next_request_time: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub batch_id: Option<i64>,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            is_running: false,
            plan: Vec::new(),
            plan_cursor: 0,
            interval_seconds: DEFAULT_INTERVAL_SECS,
            active_task: None,
            last_request_time: None,
            next_request_time: None,
            error_message: None,
            batch_id: None,
        }
    }
}

impl ControlState {
    /// Fields cleared whenever the collector stops.
    pub fn clear_run(&mut self) {
        self.is_running = false;
        self.plan.clear();
        self.plan_cursor = 0;
        self.active_task = None;
        self.next_request_time = None;
    }
}

/// Written by the loop right before a fetch: the chosen task, the cursor
/// already advanced past it, and the request timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub task: ActiveTask,
    pub next_cursor: usize,
    pub requested_at: DateTime<Utc>,
}

// =============================================================================
// MYSQL ROW
// =============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct ControlStateRow {
    pub is_running: bool,
    pub current_task_id: Option<i64>,
    pub current_server_type: Option<i32>,
    pub current_product_type: Option<i32>,
    pub current_plan: Option<String>,
    pub plan_index: i32,
    pub request_interval: i32,
    pub last_request_time: Option<DateTime<Utc>>,
    pub next_request_time: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub batch_id: Option<i64>,
}

impl TryFrom<ControlStateRow> for ControlState {
    type Error = serde_json::Error;

    fn try_from(row: ControlStateRow) -> Result<Self, Self::Error> {
        let plan: Vec<TaskKey> = match row.current_plan.as_deref() {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw)?,
            _ => Vec::new(),
        };

        let active_task = match (row.current_task_id, row.current_server_type, row.current_product_type) {
            (Some(task_id), Some(server_type), Some(product_type)) => Some(ActiveTask {
                task_id,
                server_type,
                product_type,
            }),
            _ => None,
        };

        let cursor = row.plan_index.max(0) as usize;
        let plan_cursor = if plan.is_empty() || cursor >= plan.len() { 0 } else { cursor };

        Ok(Self {
            is_running: row.is_running,
            plan,
            plan_cursor,
            interval_seconds: row.request_interval.max(1) as u32,
            active_task,
            last_request_time: row.last_request_time,
            next_request_time: row.next_request_time,
            error_message: row.error_message,
            batch_id: row.batch_id,
        })
    }
}
