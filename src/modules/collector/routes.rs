use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::AppState;
use super::controller;

pub fn collector_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/collector/status", get(controller::get_status))
        .route("/collector/start", post(controller::start))
        .route("/collector/stop", post(controller::stop))
        .route("/collector/toggle", post(controller::toggle))
        .route("/collector/update_interval", post(controller::update_interval))
        .route("/collector/tasks", get(controller::list_tasks))
}
