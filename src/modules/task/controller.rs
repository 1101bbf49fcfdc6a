use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use validator::Validate;

use crate::AppState;
use crate::modules::collector::controller::collector_error;
use crate::modules::collector::schema::ErrorResponse;
use crate::modules::task::interface::TaskError;
use crate::modules::task::schema::{
    BatchCreateRequest, BatchCreateResponse, CreateTaskRequest, CreateTaskResponse,
    DeleteTaskRequest, DeleteTaskResponse,
};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn task_error(e: TaskError) -> ApiError {
    let status = e.status_code();
    if status.is_server_error() {
        tracing::error!(error = %e, "Task request failed");
    }
    (status, Json(ErrorResponse::new(e.to_string())))
}

// =============================================================================
// POST /admin/task/create
// =============================================================================

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<CreateTaskResponse>, ApiError> {
    if let Err(e) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, Json(ErrorResponse::new(e.to_string()))));
    }

    let task = state.tasks.create(req.key()).await.map_err(task_error)?;
    tracing::info!(
        task_id = task.id,
        server_type = task.server_type,
        product_type = task.product_type,
        "Collector task created"
    );

    Ok(Json(CreateTaskResponse {
        status: "success".to_string(),
        task,
    }))
}

// =============================================================================
// POST /admin/task/batch_create
// =============================================================================

pub async fn batch_create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchCreateRequest>,
) -> Result<Json<BatchCreateResponse>, ApiError> {
    if let Err(e) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, Json(ErrorResponse::new(e.to_string()))));
    }

    let keys: Vec<_> = req.tasks.iter().map(CreateTaskRequest::key).collect();
    let outcome = state.tasks.create_many(&keys).await.map_err(task_error)?;
    tracing::info!(
        created = outcome.created.len(),
        skipped = outcome.skipped.len(),
        "Batch task creation finished"
    );

    Ok(Json(outcome.into()))
}

// =============================================================================
// POST /admin/task/delete
// =============================================================================

pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeleteTaskRequest>,
) -> Result<Json<DeleteTaskResponse>, ApiError> {
    state.engine.delete_task(req.id).await.map_err(collector_error)?;

    Ok(Json(DeleteTaskResponse {
        status: "success".to_string(),
        deleted: 1,
    }))
}

// =============================================================================
// POST /admin/task/delete_all
// =============================================================================

pub async fn delete_all_tasks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DeleteTaskResponse>, ApiError> {
    let deleted = state.engine.delete_all_tasks().await.map_err(collector_error)?;

    Ok(Json(DeleteTaskResponse {
        status: "success".to_string(),
        deleted,
    }))
}
