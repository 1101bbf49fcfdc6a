use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::interface::{ControlStateStore, Result, StoreError};
use super::model::{ControlState, Dispatch};
use crate::modules::task::model::TaskKey;

/// Control record kept in process memory.
#[derive(Default)]
pub struct InMemoryControlStateStore {
    state: Mutex<ControlState>,
    writes: AtomicUsize,
    fail_begin_run: Mutex<Option<String>>,
    fail_loads: Mutex<Option<String>>,
    mark_stopped_failures: AtomicUsize,
}

impl InMemoryControlStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: ControlState) -> Self {
        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> ControlState {
        self.state.lock().unwrap().clone()
    }

    /// Number of write calls that changed the record.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_begin_run(&self, message: Option<&str>) {
        *self.fail_begin_run.lock().unwrap() = message.map(str::to_string);
    }

    pub fn fail_loads(&self, message: Option<&str>) {
        *self.fail_loads.lock().unwrap() = message.map(str::to_string);
    }

    /// Makes the next `times` calls to `mark_stopped` fail.
    pub fn fail_mark_stopped(&self, times: usize) {
        self.mark_stopped_failures.store(times, Ordering::SeqCst);
    }

    /// Flips only the running flag, leaving plan and run fields in place.
    pub fn set_running_flag(&self, running: bool) {
        self.state.lock().unwrap().is_running = running;
    }

    fn write<T>(&self, f: impl FnOnce(&mut ControlState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        self.writes.fetch_add(1, Ordering::SeqCst);
        f(&mut *state)
    }

    fn write_if_running(&self, f: impl FnOnce(&mut ControlState)) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.is_running {
            return false;
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        f(&mut *state);
        true
    }
}

#[async_trait]
impl ControlStateStore for InMemoryControlStateStore {
    async fn load(&self) -> Result<ControlState> {
        if let Some(message) = self.fail_loads.lock().unwrap().clone() {
            return Err(StoreError::Unavailable(message));
        }
        Ok(self.snapshot())
    }

    async fn begin_run(&self, plan: Option<&[TaskKey]>) -> Result<()> {
        if let Some(message) = self.fail_begin_run.lock().unwrap().clone() {
            return Err(StoreError::Unavailable(message));
        }
        self.write(|state| {
            state.is_running = true;
            state.error_message = None;
            if let Some(plan) = plan {
                state.plan = plan.to_vec();
                state.plan_cursor = 0;
            }
        });
        Ok(())
    }

    async fn mark_stopped(&self, error: Option<&str>) -> Result<()> {
        let pending = self.mark_stopped_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.mark_stopped_failures.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("mark_stopped refused".to_string()));
        }
        self.write(|state| {
            state.clear_run();
            state.error_message = error.map(str::to_string);
        });
        Ok(())
    }

    async fn schedule_next(&self, at: DateTime<Utc>) -> Result<bool> {
        Ok(self.write_if_running(|state| state.next_request_time = Some(at)))
    }

    async fn record_dispatch(&self, dispatch: &Dispatch) -> Result<bool> {
        Ok(self.write_if_running(|state| {
            state.active_task = Some(dispatch.task);
            state.plan_cursor = dispatch.next_cursor;
            state.last_request_time = Some(dispatch.requested_at);
            state.error_message = None;
        }))
    }

    async fn advance_cursor(&self, cursor: usize) -> Result<bool> {
        Ok(self.write_if_running(|state| state.plan_cursor = cursor))
    }

    async fn record_error(&self, message: &str) -> Result<bool> {
        Ok(self.write_if_running(|state| state.error_message = Some(message.to_string())))
    }

    async fn set_batch_id(&self, batch_id: i64) -> Result<()> {
        self.write(|state| state.batch_id = Some(batch_id));
        Ok(())
    }

    async fn set_interval(&self, seconds: u32) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if state.is_running {
            return Ok(false);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        state.interval_seconds = seconds;
        Ok(true)
    }

    async fn clear_plan(&self) -> Result<()> {
        self.write(|state| {
            state.plan.clear();
            state.plan_cursor = 0;
            state.active_task = None;
            state.error_message = None;
        });
        Ok(())
    }
}
