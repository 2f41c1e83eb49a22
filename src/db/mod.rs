//! Database module

pub mod connection;
pub mod models;
pub mod schema;
pub mod store;

pub use connection::Database;
pub use store::PersistenceStore;
