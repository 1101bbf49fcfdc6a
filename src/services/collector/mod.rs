pub mod clock;
pub mod engine;
pub mod error;
pub mod merger;
pub mod plan;
mod worker;

pub use clock::{Clock, SystemClock, TokioClock};
pub use engine::{CollectorDeps, CollectorEngine, CollectorStatus, StartOutcome, StopOutcome};
pub use error::{CollectorError, CycleError, MergeError};
pub use merger::{MarketMerger, MergeSummary};
