pub mod crud;
pub mod interface;
pub mod memory;
pub mod model;

pub use crud::MarketCrud;
pub use interface::{MarketError, MarketRepository};
pub use memory::InMemoryMarketRepository;
