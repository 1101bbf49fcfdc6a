pub mod controller;
pub mod crud;
pub mod interface;
pub mod memory;
pub mod model;
pub mod routes;
pub mod schema;

pub use crud::ControlStateCrud;
pub use interface::{ControlStateStore, StoreError};
pub use memory::InMemoryControlStateStore;
pub use routes::collector_routes;
