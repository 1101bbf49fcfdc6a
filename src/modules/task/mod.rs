pub mod controller;
pub mod crud;
pub mod interface;
pub mod memory;
pub mod model;
pub mod routes;
pub mod schema;

pub use crud::TaskCrud;
pub use interface::{TaskError, TaskRegistry};
pub use memory::InMemoryTaskRegistry;
pub use routes::task_routes;
