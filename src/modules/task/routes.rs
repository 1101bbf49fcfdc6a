use axum::{routing::post, Router};
use std::sync::Arc;

use crate::AppState;
use super::controller;

pub fn task_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/task/create", post(controller::create_task))
        .route("/task/batch_create", post(controller::batch_create))
        .route("/task/delete", post(controller::delete_task))
        .route("/task/delete_all", post(controller::delete_all_tasks))
}
