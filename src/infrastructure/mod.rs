pub mod core;
pub mod csv_source;
pub mod factory;
pub mod mock;
pub mod persistence;
pub mod repositories;
pub mod yahoo;

pub use repositories::InMemoryModelStore;
