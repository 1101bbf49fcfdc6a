use axum::{extract::State, http::StatusCode, Json};
use std::collections::BTreeMap;
use std::sync::Arc;
use validator::Validate;

use crate::AppState;
use crate::modules::collector::schema::{
    ErrorResponse, StartResponse, StatusResponse, StopRequest, StopResponse, TasksResponse,
    ToggleRequest, UpdateIntervalRequest, UpdateIntervalResponse,
};
use crate::modules::market::interface::MarketError;
use crate::modules::market::model::TableStats;
use crate::services::collector::{CollectorError, StartOutcome, StopOutcome};

type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn collector_error(e: CollectorError) -> ApiError {
    let status = e.status_code();
    if status.is_server_error() {
        tracing::error!(error = %e, "Collector request failed");
    }
    (status, Json(ErrorResponse::new(e.to_string())))
}

// =============================================================================
// GET /admin/collector/status
// =============================================================================

pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, ApiError> {
    let status = state.engine.status().await.map_err(collector_error)?;
    Ok(Json(status.into()))
}

// =============================================================================
// POST /admin/collector/start
// =============================================================================

pub async fn start(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StartResponse>, ApiError> {
    let outcome = state.engine.start().await.map_err(collector_error)?;
    Ok(Json(start_response(outcome)))
}

// =============================================================================
// POST /admin/collector/stop
// =============================================================================

pub async fn stop(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StopRequest>,
) -> Result<Json<StopResponse>, ApiError> {
    if let Err(e) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, Json(ErrorResponse::new(e.to_string()))));
    }

    let reason = req.reason.as_deref().unwrap_or("operator request");
    let outcome = state.engine.stop(reason).await.map_err(collector_error)?;
    Ok(Json(stop_response(outcome)))
}

// =============================================================================
// POST /admin/collector/toggle
// =============================================================================

pub async fn toggle(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ToggleRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let body = if req.is_running {
        let outcome = state.engine.start().await.map_err(collector_error)?;
        serde_json::to_value(start_response(outcome))
    } else {
        let outcome = state
            .engine
            .stop("toggled off from admin panel")
            .await
            .map_err(collector_error)?;
        serde_json::to_value(stop_response(outcome))
    };

    body.map(Json).map_err(|e| {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::new(e.to_string())))
    })
}

// =============================================================================
// POST /admin/collector/update_interval
// =============================================================================

pub async fn update_interval(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateIntervalRequest>,
) -> Result<Json<UpdateIntervalResponse>, ApiError> {
    if let Err(e) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, Json(ErrorResponse::new(e.to_string()))));
    }

    let seconds = state
        .engine
        .update_interval(req.request_interval)
        .await
        .map_err(collector_error)?;

    Ok(Json(UpdateIntervalResponse {
        status: "success".to_string(),
        request_interval: seconds,
    }))
}

// =============================================================================
// GET /admin/collector/tasks
// =============================================================================

pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TasksResponse>, ApiError> {
    let tasks = state
        .tasks
        .list()
        .await
        .map_err(|e| (e.status_code(), Json(ErrorResponse::new(e.to_string()))))?;

    let mut table_stats = BTreeMap::new();
    for task in &tasks {
        let key = task.key();
        let stats = match state.markets.table_stats(key).await {
            Ok(stats) => stats,
            Err(MarketError::MissingTable(_)) => TableStats::default(),
            Err(e) => {
                tracing::error!(error = %e, table = %key.table_name(), "Failed to read table stats");
                return Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new(e.to_string())),
                ));
            }
        };
        table_stats.insert(key.table_name(), stats);
    }

    Ok(Json(TasksResponse { tasks, table_stats }))
}

fn start_response(outcome: StartOutcome) -> StartResponse {
    match outcome {
        StartOutcome::Started { plan_len } => StartResponse {
            status: "success".to_string(),
            already_running: false,
            plan_len: Some(plan_len),
        },
        StartOutcome::AlreadyRunning => StartResponse {
            status: "success".to_string(),
            already_running: true,
            plan_len: None,
        },
    }
}

fn stop_response(outcome: StopOutcome) -> StopResponse {
    StopResponse {
        status: "success".to_string(),
        already_stopped: outcome == StopOutcome::AlreadyStopped,
    }
}
