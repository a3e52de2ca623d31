//! Database connection and initialization

use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use super::schema;

/// Database wrapper with a shared, lock-protected connection
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Opens (or creates) the database at `path` and applies the schema
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(&path).context("Failed to open database")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .context("Failed to configure busy timeout")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        };
        db.initialize()?;

        Ok(db)
    }

    /// Creates an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
        };
        db.initialize()?;

        Ok(db)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;
        schema::create_tables(&conn)
    }

    /// Lock the connection, mapping poisoning to an error
    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }

    /// Get a shared handle to the connection
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// Get database path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Platform data directory for this application
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("NexusResearch")
    }

    /// Get default database path for the application
    pub fn default_path() -> PathBuf {
        Self::data_dir().join("research.db")
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_db() {
        let db = Database::in_memory().expect("Failed to create in-memory db");
        assert_eq!(db.path().to_str(), Some(":memory:"));
    }

    #[test]
    fn test_default_path() {
        let path = Database::default_path();
        assert!(path.to_string_lossy().contains("NexusResearch"));
        assert!(path.ends_with("research.db"));
    }

    #[test]
    fn test_clones_share_connection() {
        let db = Database::in_memory().unwrap();
        let other = db.clone();
        db.lock()
            .unwrap()
            .execute(
                "INSERT INTO research_cache (topic, last_computed_at) VALUES ('t', '2024-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
        let count: i64 = other
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM research_cache", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
