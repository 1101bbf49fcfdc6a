use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::clock::{Clock, SystemClock};
use super::error::CollectorError;
use super::merger::MarketMerger;
use super::plan::build_plan;
use super::worker::{self, Context};
use crate::config::collector::{interval_in_bounds, CollectorSettings};
use crate::modules::collector::interface::ControlStateStore;
use crate::modules::collector::model::ActiveTask;
use crate::modules::market::interface::MarketRepository;
use crate::modules::task::interface::TaskRegistry;
use crate::modules::task::model::CollectorTask;
use crate::services::market_api::MarketFetcher;
use crate::services::metrics::collectors::CollectorMetrics;

// =============================================================================
// PUBLIC TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started { plan_len: usize },
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped,
    AlreadyStopped,
}

/// Snapshot returned by the status read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectorStatus {
    pub is_running: bool,
    pub active_task: Option<ActiveTask>,
    pub last_request_time: Option<chrono::DateTime<chrono::Utc>>,
    pub next_request_time: Option<chrono::DateTime<chrono::Utc>>,
    pub interval_seconds: u32,
    pub error_message: Option<String>,
    pub batch_id: Option<i64>,
    pub plan_len: usize,
    pub plan_cursor: usize,
    pub loop_alive: bool,
}

/// Collaborators the engine is built from.
pub struct CollectorDeps {
    pub store: Arc<dyn ControlStateStore>,
    pub tasks: Arc<dyn TaskRegistry>,
    pub markets: Arc<dyn MarketRepository>,
    pub fetcher: Arc<dyn MarketFetcher>,
    pub clock: Arc<dyn Clock>,
    pub settings: CollectorSettings,
    pub metrics: Option<CollectorMetrics>,
}

impl CollectorDeps {
    pub fn new(
        store: Arc<dyn ControlStateStore>,
        tasks: Arc<dyn TaskRegistry>,
        markets: Arc<dyn MarketRepository>,
        fetcher: Arc<dyn MarketFetcher>,
    ) -> Self {
        Self {
            store,
            tasks,
            markets,
            fetcher,
            clock: Arc::new(SystemClock),
            settings: CollectorSettings::default(),
            metrics: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_settings(mut self, settings: CollectorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_metrics(mut self, metrics: CollectorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

// =============================================================================
// ENGINE
// =============================================================================

struct Activation {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Activation {
    fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

/// Owns the single polling loop of the process.
///
/// Start and stop are serialized through the activation lock, so at most one
/// loop exists at a time. The persisted control record decides whether the
/// loop should be running; `stop()` writes it first and the loop only writes
/// while it still says running.
pub struct CollectorEngine {
    ctx: Arc<Context>,
    tasks: Arc<dyn TaskRegistry>,
    activation: Mutex<Activation>,
}

impl CollectorEngine {
    pub fn new(deps: CollectorDeps) -> Arc<Self> {
        let merger = MarketMerger::new(deps.markets, deps.store.clone(), deps.clock.clone());
        let ctx = Arc::new(Context {
            store: deps.store,
            tasks: deps.tasks.clone(),
            fetcher: deps.fetcher,
            merger,
            clock: deps.clock,
            settings: deps.settings,
            metrics: deps.metrics,
            loop_alive: AtomicBool::new(false),
        });

        Arc::new(Self {
            ctx,
            tasks: deps.tasks,
            activation: Mutex::new(Activation {
                token: CancellationToken::new(),
                handle: None,
            }),
        })
    }

    /// Builds the engine and reconciles it with the persisted record: a run
    /// interrupted by a restart is resumed, a run without a plan is marked
    /// stopped.
    pub async fn bootstrap(deps: CollectorDeps) -> Result<Arc<Self>, CollectorError> {
        let engine = Self::new(deps);
        let state = engine.ctx.store.load().await?;

        if state.is_running && !state.plan.is_empty() {
            tracing::info!(
                plan_len = state.plan.len(),
                plan_cursor = state.plan_cursor,
                "Resuming collector from persisted state"
            );
            let mut activation = engine.activation.lock().await;
            engine.spawn(&mut activation);
        } else if state.is_running {
            tracing::warn!("Persisted state is running without a plan, marking stopped");
            engine.ctx.store.mark_stopped(None).await?;
        }

        Ok(engine)
    }

    /// Builds a fresh plan from the registry and launches the loop.
    /// A no-op when the loop is already alive.
    pub async fn start(&self) -> Result<StartOutcome, CollectorError> {
        let mut activation = self.activation.lock().await;
        if activation.is_alive() {
            tracing::warn!("Collector already running, ignoring start");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let tasks = self.tasks.list().await?;
        if tasks.is_empty() {
            return Err(CollectorError::NoTasks);
        }
        let plan = build_plan(&tasks);

        if let Err(e) = self.ctx.store.begin_run(Some(&plan)).await {
            tracing::error!(error = %e, "Failed to persist running state");
            let message = format!("Failed to start collector: {e}");
            if let Err(rollback) = self.ctx.store.mark_stopped(Some(&message)).await {
                tracing::error!(error = %rollback, "Failed to roll back collector state");
            }
            return Err(CollectorError::StartFailure(e.to_string()));
        }

        self.spawn(&mut activation);
        tracing::info!(plan_len = plan.len(), "Collector started");
        Ok(StartOutcome::Started { plan_len: plan.len() })
    }

    /// Stops the loop. Persists the stopped state right away, abandons any
    /// in-flight request and waits at most the configured grace period for
    /// the loop to exit before aborting it.
    pub async fn stop(&self, reason: &str) -> Result<StopOutcome, CollectorError> {
        let mut activation = self.activation.lock().await;
        let alive = activation.is_alive();

        let persisted_running = match self.ctx.store.load().await {
            Ok(state) => state.is_running,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read control state, forcing stop");
                true
            }
        };

        if !alive && !persisted_running {
            tracing::debug!(reason, "Collector already stopped");
            return Ok(StopOutcome::AlreadyStopped);
        }

        tracing::info!(reason, "Stopping collector");
        activation.token.cancel();
        let written = self.ctx.store.mark_stopped(None).await;
        self.ctx.fetcher.reset();

        if let Some(handle) = activation.handle.take() {
            let abort = handle.abort_handle();
            match tokio::time::timeout(self.ctx.settings.stop_grace, handle).await {
                Ok(Ok(())) => tracing::debug!("Collector loop exited"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Collector loop ended abnormally"),
                Err(_) => {
                    tracing::warn!("Collector loop did not exit in time, aborting it");
                    abort.abort();
                    self.ctx.loop_alive.store(false, Ordering::SeqCst);
                }
            }
        }

        if let Some(metrics) = &self.ctx.metrics {
            metrics.set_running(false);
        }

        match written {
            Ok(()) => Ok(StopOutcome::Stopped),
            Err(e) => {
                tracing::error!(error = %e, "Failed to persist stopped state, retrying");
                let message = format!("Failed to stop collector: {e}");
                if let Err(retry) = self.ctx.store.mark_stopped(Some(&message)).await {
                    tracing::error!(error = %retry, "Failed to persist stopped state on retry");
                }
                Err(CollectorError::StopFailure(e.to_string()))
            }
        }
    }

    pub async fn status(&self) -> Result<CollectorStatus, CollectorError> {
        let state = self.ctx.store.load().await?;
        Ok(CollectorStatus {
            is_running: state.is_running,
            active_task: state.active_task,
            last_request_time: state.last_request_time,
            next_request_time: state.next_request_time,
            interval_seconds: state.interval_seconds,
            error_message: state.error_message,
            batch_id: state.batch_id,
            plan_len: state.plan.len(),
            plan_cursor: state.plan_cursor,
            loop_alive: self.ctx.loop_alive.load(Ordering::SeqCst),
        })
    }

    /// Only accepted while stopped.
    pub async fn update_interval(&self, seconds: i64) -> Result<u32, CollectorError> {
        if !interval_in_bounds(seconds) {
            return Err(CollectorError::InvalidInterval(seconds));
        }
        if self.ctx.loop_alive.load(Ordering::SeqCst) {
            return Err(CollectorError::Running);
        }

        let seconds = seconds as u32;
        if !self.ctx.store.set_interval(seconds).await? {
            return Err(CollectorError::Running);
        }
        tracing::info!(interval_seconds = seconds, "Collector interval updated");
        Ok(seconds)
    }

    /// Holds the activation lock throughout so a concurrent `start` cannot
    /// plan around a task that is being removed.
    pub async fn delete_task(&self, id: i64) -> Result<CollectorTask, CollectorError> {
        let activation = self.activation.lock().await;
        self.ensure_stopped(&activation).await?;
        let task = self.tasks.delete(id).await?;
        tracing::info!(
            task_id = task.id,
            server_type = task.server_type,
            product_type = task.product_type,
            "Collector task deleted"
        );
        Ok(task)
    }

    /// Deletes every task and clears the stored plan.
    pub async fn delete_all_tasks(&self) -> Result<u64, CollectorError> {
        let activation = self.activation.lock().await;
        self.ensure_stopped(&activation).await?;
        let deleted = self.tasks.delete_all().await?;
        self.ctx.store.clear_plan().await?;
        tracing::info!(deleted, "All collector tasks deleted");
        Ok(deleted)
    }

    async fn ensure_stopped(&self, activation: &Activation) -> Result<(), CollectorError> {
        if activation.is_alive() || self.ctx.store.load().await?.is_running {
            return Err(CollectorError::Running);
        }
        Ok(())
    }

    fn spawn(&self, activation: &mut Activation) {
        let token = CancellationToken::new();
        activation.token = token.clone();
        self.ctx.loop_alive.store(true, Ordering::SeqCst);
        if let Some(metrics) = &self.ctx.metrics {
            metrics.set_running(true);
        }
        activation.handle = Some(tokio::spawn(worker::run(self.ctx.clone(), token)));
    }
}
