pub mod collector;
pub mod database;
pub mod environment;

pub use collector::CollectorSettings;
pub use database::{init_db, DbPool};
pub use environment::Config;
