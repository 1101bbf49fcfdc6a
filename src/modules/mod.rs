pub mod collector;
pub mod market;
pub mod metrics;
pub mod task;
