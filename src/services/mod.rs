pub mod collector;
pub mod market_api;
pub mod metrics;
