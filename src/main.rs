use std::sync::Arc;

use market_collector::config::{environment::Config, init_db, CollectorSettings};
use market_collector::modules::collector::ControlStateCrud;
use market_collector::modules::market::{MarketCrud, MarketRepository};
use market_collector::modules::task::{TaskCrud, TaskRegistry};
use market_collector::services::collector::{CollectorDeps, CollectorEngine};
use market_collector::services::market_api::MarketApiClient;
use market_collector::services::metrics::{collectors::CollectorMetrics, MetricsRegistry};
use market_collector::{create_app, AppState};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "market_collector=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().expect("Failed to load environment configuration");
    let settings = CollectorSettings::from_env().expect("Failed to load collector settings");

    let db = init_db(&config).await.expect("Failed to connect to MySQL");
    tracing::info!("Connected to MySQL, migrations applied");

    let control = ControlStateCrud::new(db.clone());
    control
        .ensure_row()
        .await
        .expect("Failed to seed collector control record");

    let markets: Arc<dyn MarketRepository> = Arc::new(MarketCrud::new(db.clone()));
    let tasks: Arc<dyn TaskRegistry> = Arc::new(TaskCrud::new(db.clone(), markets.clone()));
    let fetcher = MarketApiClient::new(
        config.market_api_url.clone(),
        config.connect_timeout,
        config.read_timeout,
    )
    .expect("Failed to build market API client");

    let metrics = MetricsRegistry::new().expect("Failed to create metrics registry");

    let deps = CollectorDeps::new(Arc::new(control), tasks.clone(), markets.clone(), Arc::new(fetcher))
        .with_settings(settings)
        .with_metrics(CollectorMetrics::new(metrics.clone()));
    let engine = CollectorEngine::bootstrap(deps)
        .await
        .expect("Failed to initialise collector engine");

    let app = create_app(AppState {
        engine: engine.clone(),
        tasks,
        markets,
        metrics,
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind listener");
    tracing::info!("Server running on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    if let Err(e) = engine.stop("shutdown signal").await {
        tracing::error!(error = %e, "Failed to stop collector during shutdown");
    }
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
