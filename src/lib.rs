//! Taskbot core - persistence and identity management for a chat task-tracking bot

pub mod cache;
pub mod db;
pub mod error;

pub use db::{Database, PersistenceStore};
pub use error::{Error, Result};
