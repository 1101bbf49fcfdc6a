use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, Pool};

use super::interface::{ControlStateStore, Result, StoreError};
use super::model::{ControlState, ControlStateRow, Dispatch};
use crate::modules::task::model::TaskKey;

const STATUS_ID: i32 = 1;

pub struct ControlStateCrud {
    pool: Pool<MySql>,
}

impl ControlStateCrud {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    /// Seeds the control row if a fresh schema lacks it.
    pub async fn ensure_row(&self) -> Result<()> {
        sqlx::query("INSERT IGNORE INTO collector_status (id, is_running, request_interval) VALUES (?, 0, 60)")
            .bind(STATUS_ID)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ControlStateStore for ControlStateCrud {
    async fn load(&self) -> Result<ControlState> {
        let row = sqlx::query_as::<_, ControlStateRow>(
            r#"
            SELECT is_running, current_task_id, current_server_type, current_product_type,
                   current_plan, plan_index, request_interval, last_request_time,
                   next_request_time, error_message, batch_id
            FROM collector_status
            WHERE id = ?
            "#,
        )
        .bind(STATUS_ID)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::Missing)?;

        Ok(ControlState::try_from(row)?)
    }

    async fn begin_run(&self, plan: Option<&[TaskKey]>) -> Result<()> {
        match plan {
            Some(plan) => {
                let encoded = serde_json::to_string(plan)?;
                sqlx::query(
                    r#"
                    UPDATE collector_status
                    SET is_running = 1,
                        current_plan = ?,
                        plan_index = 0,
                        error_message = NULL,
                        updated_at = NOW()
                    WHERE id = ?
                    "#,
                )
                .bind(encoded)
                .bind(STATUS_ID)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE collector_status
                    SET is_running = 1,
                        error_message = NULL,
                        updated_at = NOW()
                    WHERE id = ?
                    "#,
                )
                .bind(STATUS_ID)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    async fn mark_stopped(&self, error: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE collector_status
            SET is_running = 0,
                current_task_id = NULL,
                current_server_type = NULL,
                current_product_type = NULL,
                current_plan = NULL,
                plan_index = 0,
                error_message = ?,
                next_request_time = NULL,
                updated_at = NOW()
            WHERE id = ?
            "#,
        )
        .bind(error)
        .bind(STATUS_ID)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn schedule_next(&self, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE collector_status SET next_request_time = ? WHERE id = ? AND is_running = 1",
        )
        .bind(at)
        .bind(STATUS_ID)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_dispatch(&self, dispatch: &Dispatch) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE collector_status
            SET current_server_type = ?,
                current_product_type = ?,
                current_task_id = ?,
                plan_index = ?,
                last_request_time = ?,
                error_message = NULL,
                updated_at = NOW()
            WHERE id = ? AND is_running = 1
            "#,
        )
        .bind(dispatch.task.server_type)
        .bind(dispatch.task.product_type)
        .bind(dispatch.task.task_id)
        .bind(dispatch.next_cursor as i32)
        .bind(dispatch.requested_at)
        .bind(STATUS_ID)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn advance_cursor(&self, cursor: usize) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE collector_status SET plan_index = ?, updated_at = NOW() WHERE id = ? AND is_running = 1",
        )
        .bind(cursor as i32)
        .bind(STATUS_ID)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_error(&self, message: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE collector_status SET error_message = ?, updated_at = NOW() WHERE id = ? AND is_running = 1",
        )
        .bind(message)
        .bind(STATUS_ID)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_batch_id(&self, batch_id: i64) -> Result<()> {
        sqlx::query("UPDATE collector_status SET batch_id = ? WHERE id = ?")
            .bind(batch_id)
            .bind(STATUS_ID)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_interval(&self, seconds: u32) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE collector_status SET request_interval = ?, updated_at = NOW() WHERE id = ? AND is_running = 0",
        )
        .bind(seconds as i32)
        .bind(STATUS_ID)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_plan(&self) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE collector_status
            SET current_plan = NULL,
                plan_index = 0,
                current_task_id = NULL,
                current_server_type = NULL,
                current_product_type = NULL,
                error_message = NULL
            WHERE id = ?
            "#,
        )
        .bind(STATUS_ID)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
