use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use super::clock::Clock;
use super::error::CycleError;
use super::merger::MarketMerger;
use super::plan;
use crate::config::collector::CollectorSettings;
use crate::modules::collector::interface::ControlStateStore;
use crate::modules::collector::model::{ActiveTask, Dispatch};
use crate::modules::task::interface::TaskRegistry;
use crate::services::market_api::{FetchError, MarketFetcher};
use crate::services::metrics::collectors::CollectorMetrics;

/// Everything one loop activation needs, shared with the engine.
pub(crate) struct Context {
    pub store: Arc<dyn ControlStateStore>,
    pub tasks: Arc<dyn TaskRegistry>,
    pub fetcher: Arc<dyn MarketFetcher>,
    pub merger: MarketMerger,
    pub clock: Arc<dyn Clock>,
    pub settings: CollectorSettings,
    pub metrics: Option<CollectorMetrics>,
    pub loop_alive: AtomicBool,
}

/// Why an activation ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exit {
    /// The cancellation token fired.
    Cancelled,
    /// The persisted record said stopped, or a guarded write was refused.
    Stopped,
}

enum Step {
    Continue,
    Exit(Exit),
}

/// Body of one activation. Never panics outward: failures that end the
/// loop force the persisted state to stopped.
pub(crate) async fn run(ctx: Arc<Context>, token: CancellationToken) {
    tracing::info!("Collector loop started");

    let outcome = AssertUnwindSafe(run_cycles(&ctx, &token)).catch_unwind().await;

    match outcome {
        Ok(Ok(Exit::Cancelled)) => tracing::info!("Collector loop cancelled"),
        Ok(Ok(Exit::Stopped)) => {
            tracing::info!("Collector loop observed stopped state");
            settle_stopped(&ctx, &token).await;
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Collector loop failed");
            force_stop(&ctx, &token, &format!("Collector stopped: {e}")).await;
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!(panic = %message, "Collector loop panicked");
            force_stop(&ctx, &token, &format!("Collector crashed: {message}")).await;
        }
    }

    ctx.loop_alive.store(false, Ordering::SeqCst);
    if let Some(metrics) = &ctx.metrics {
        metrics.set_running(false);
    }
}

async fn run_cycles(ctx: &Context, token: &CancellationToken) -> Result<Exit, CycleError> {
    loop {
        if token.is_cancelled() {
            return Ok(Exit::Cancelled);
        }

        let err = match cycle(ctx, token).await {
            Ok(Step::Continue) => continue,
            Ok(Step::Exit(exit)) => return Ok(exit),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => e,
        };

        if let Some(metrics) = &ctx.metrics {
            metrics.record_cycle_error(err.kind());
        }

        let backoff = match &err {
            CycleError::NoPlan => {
                tracing::warn!("No collection plan, waiting");
                ctx.settings.idle_backoff
            }
            CycleError::TaskGone(key) => {
                tracing::warn!(
                    server_type = key.server_type,
                    product_type = key.product_type,
                    "Task was deleted, skipping to next plan entry"
                );
                ctx.settings.missing_task_backoff
            }
            _ => {
                tracing::error!(error = %err, kind = err.kind(), "Collection cycle failed");
                match ctx.store.record_error(&err.to_string()).await {
                    Ok(true) => {}
                    Ok(false) => return Ok(Exit::Stopped),
                    Err(e) => tracing::error!(error = %e, "Failed to record collector error"),
                }
                ctx.settings.retry_backoff
            }
        };

        if sleep_or_cancel(token, backoff).await {
            return Ok(Exit::Cancelled);
        }
    }
}

/// One pass through WAITING, DISPATCHING, FETCHING and MERGING.
async fn cycle(ctx: &Context, token: &CancellationToken) -> Result<Step, CycleError> {
    let state = ctx.store.load().await?;

    if token.is_cancelled() {
        return Ok(Step::Exit(Exit::Cancelled));
    }
    if !state.is_running {
        return Ok(Step::Exit(Exit::Stopped));
    }

    let Some(selection) = plan::select(&state.plan, state.plan_cursor) else {
        return Err(CycleError::NoPlan);
    };

    // WAITING
    let now = ctx.clock.now();
    if let Some(last) = state.last_request_time {
        let due = last + chrono::Duration::seconds(i64::from(state.interval_seconds));
        if now < due {
            if !ctx.store.schedule_next(due).await? {
                return Ok(Step::Exit(Exit::Stopped));
            }
            let wait = (due - now).to_std().unwrap_or_default();
            tracing::debug!(wait_secs = wait.as_secs_f64(), "Waiting for next request slot");
            if sleep_or_cancel(token, wait).await {
                return Ok(Step::Exit(Exit::Cancelled));
            }
            return Ok(Step::Continue);
        }
    }

    // DISPATCHING
    if selection.starts_rotation() {
        tracing::info!(plan_len = state.plan.len(), "Starting new plan rotation");
    }

    let key = selection.key;
    let Some(task) = ctx.tasks.find(key).await? else {
        if !ctx.store.advance_cursor(selection.next_cursor).await? {
            return Ok(Step::Exit(Exit::Stopped));
        }
        return Err(CycleError::TaskGone(key));
    };

    let dispatch = Dispatch {
        task: ActiveTask {
            task_id: task.id,
            server_type: task.server_type,
            product_type: task.product_type,
        },
        next_cursor: selection.next_cursor,
        requested_at: now,
    };
    if !ctx.store.record_dispatch(&dispatch).await? {
        return Ok(Step::Exit(Exit::Stopped));
    }
    if selection.completes_rotation() {
        if let Some(metrics) = &ctx.metrics {
            metrics.record_rotation();
        }
    }

    // FETCHING
    let started = Instant::now();
    let fetched = tokio::select! {
        biased;
        _ = token.cancelled() => {
            tracing::info!(task_id = task.id, "In-flight fetch abandoned");
            return Ok(Step::Exit(Exit::Cancelled));
        }
        result = ctx.fetcher.fetch(key) => result,
    };

    if let Some(metrics) = &ctx.metrics {
        metrics.record_fetch(key, fetch_outcome(&fetched), started.elapsed());
    }
    let listings = fetched?;

    if token.is_cancelled() {
        return Ok(Step::Exit(Exit::Cancelled));
    }

    // MERGING
    let summary = ctx.merger.merge(key, &listings).await?;

    if let Some(metrics) = &ctx.metrics {
        metrics.record_merge(key, summary.inserted, summary.updated);
    }
    tracing::info!(
        task_id = task.id,
        server_type = key.server_type,
        product_type = key.product_type,
        batch_id = summary.batch_id,
        inserted = summary.inserted,
        updated = summary.updated,
        "Merged market listings"
    );

    Ok(Step::Continue)
}

/// Sleeps for `duration`. Returns true when cancelled first.
async fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

async fn force_stop(ctx: &Context, token: &CancellationToken, message: &str) {
    // A concurrent stop() has already persisted the stopped state.
    if token.is_cancelled() {
        return;
    }
    if let Err(e) = ctx.store.mark_stopped(Some(message)).await {
        tracing::error!(error = %e, "Failed to persist stopped state after loop failure");
    }
}

/// The flag was cleared without the rest of the run fields. Clears them
/// while keeping whatever error message is stored.
async fn settle_stopped(ctx: &Context, token: &CancellationToken) {
    if token.is_cancelled() {
        return;
    }
    let error = match ctx.store.load().await {
        Ok(state) => state.error_message,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read control state before exiting");
            None
        }
    };
    if let Err(e) = ctx.store.mark_stopped(error.as_deref()).await {
        tracing::error!(error = %e, "Failed to persist stopped state before exiting");
    }
}

fn fetch_outcome<T>(result: &Result<T, FetchError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(FetchError::Timeout { .. }) => "timeout",
        Err(FetchError::Http { .. }) => "network",
        Err(FetchError::Status { .. }) => "status",
        Err(FetchError::Decode { .. }) => "decode",
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
