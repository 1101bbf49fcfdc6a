pub mod config;
pub mod modules;
pub mod services;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use modules::collector::collector_routes;
use modules::market::MarketRepository;
use modules::metrics::metrics_routes;
use modules::task::{task_routes, TaskRegistry};
use services::collector::CollectorEngine;
use services::metrics::{metrics_middleware, MetricsRegistry};

pub struct AppState {
    pub engine: Arc<CollectorEngine>,
    pub tasks: Arc<dyn TaskRegistry>,
    pub markets: Arc<dyn MarketRepository>,
    pub metrics: Arc<MetricsRegistry>,
}

pub fn create_app(state: AppState) -> Router {
    let state = Arc::new(state);
    let admin = collector_routes().merge(task_routes());

    Router::new()
        .route("/", get(root))
        .nest("/admin", admin)
        .merge(metrics_routes())
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            metrics_middleware,
        ))
        // Applied innermost-first: body limit, then CORS, then tracing outermost.
        .layer(RequestBodyLimitLayer::new(1024 * 1024)) // 1MB max body
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> &'static str {
    "Market Collector API"
}
