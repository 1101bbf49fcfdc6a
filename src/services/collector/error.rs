use axum::http::StatusCode;

use crate::modules::collector::interface::StoreError;
use crate::modules::market::interface::MarketError;
use crate::modules::task::interface::TaskError;
use crate::modules::task::model::TaskKey;
use crate::services::market_api::FetchError;

// =============================================================================
// OPERATOR-FACING ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("No collector tasks configured")]
    NoTasks,

    #[error("Collector is running, stop it first")]
    Running,

    #[error("Request interval must be between 1 and 3600 seconds, got {0}")]
    InvalidInterval(i64),

    #[error("Failed to start collector: {0}")]
    StartFailure(String),

    #[error("Failed to stop collector: {0}")]
    StopFailure(String),

    #[error("Task not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Task(TaskError),
}

impl From<TaskError> for CollectorError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::NotFound => Self::NotFound,
            other => Self::Task(other),
        }
    }
}

impl CollectorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoTasks => StatusCode::BAD_REQUEST,
            Self::Running => StatusCode::CONFLICT,
            Self::InvalidInterval(_) => StatusCode::BAD_REQUEST,
            Self::StartFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::StopFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Task(e) => e.status_code(),
        }
    }
}

// =============================================================================
// MERGE ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("Failed to record batch id: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to write market batch: {0}")]
    Market(#[from] MarketError),
}

// =============================================================================
// LOOP ERRORS
// =============================================================================

/// Failures inside one loop cycle. Being told to stop is not one of them.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("No collection plan")]
    NoPlan,

    #[error("Task {0} no longer exists")]
    TaskGone(TaskKey),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error("Task lookup failed: {0}")]
    Registry(#[from] TaskError),

    #[error("Control store error: {0}")]
    Store(#[from] StoreError),
}

impl CycleError {
    /// Label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoPlan | Self::TaskGone(_) => "configuration",
            Self::Fetch(_) => "fetch",
            Self::Merge(_) => "merge",
            Self::Registry(_) => "registry",
            Self::Store(_) => "store",
        }
    }

    /// Errors that end the activation instead of backing off.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(StoreError::CorruptPlan(_) | StoreError::Missing))
    }
}
