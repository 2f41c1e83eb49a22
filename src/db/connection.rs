//! Database connection management
//!
//! NOTE: This implementation uses synchronous rusqlite with tokio::Mutex.
//! Every store operation holds the connection lock from first read to
//! commit, which also serializes counter allocation (see store.rs).

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::Result;

use super::schema::SCHEMA;

pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: String,
}

impl Database {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Database initialized at {:?}", path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_string_lossy().to_string(),
        })
    }

    /// Get a locked connection.
    ///
    /// WARNING: This holds the mutex for the duration of the operation,
    /// blocking other async tasks from accessing the database.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }

    /// Get the database path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Check if database is accessible (for health checks)
    pub async fn health_check(&self) -> Result<bool> {
        let conn = self.lock().await;
        match conn.query_row("SELECT 1", [], |_| Ok(())) {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::warn!("Database health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            path: self.path.clone(),
        }
    }
}
