//! Database schema definitions
//!
//! Creates and migrates the SQLite tables

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create all database tables
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Devices discovered by the protocol probes, one row per address
        CREATE TABLE IF NOT EXISTS discovered_devices (
            address TEXT PRIMARY KEY NOT NULL,
            hardware_id TEXT,
            display_name TEXT NOT NULL,
            device_kind TEXT NOT NULL DEFAULT 'unknown',
            discovery_protocol TEXT NOT NULL,
            credentials TEXT,
            description TEXT,
            location TEXT,
            first_seen TEXT NOT NULL,
            last_seen TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active'
        );

        -- Research cache: last computation per topic
        CREATE TABLE IF NOT EXISTS research_cache (
            topic TEXT PRIMARY KEY NOT NULL,
            research_data TEXT,
            last_computed_at TEXT NOT NULL
        );

        -- Adaptation intents handed to the device-management side
        CREATE TABLE IF NOT EXISTS adaptation_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            finding_kind TEXT NOT NULL,
            feature TEXT NOT NULL,
            action TEXT NOT NULL,
            priority INTEGER NOT NULL,
            success INTEGER NOT NULL DEFAULT 0,
            detail TEXT
        );

        -- Append-only cycle log
        CREATE TABLE IF NOT EXISTS cycle_summaries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            cycle_number INTEGER NOT NULL,
            findings_count INTEGER NOT NULL DEFAULT 0,
            adaptations_count INTEGER NOT NULL DEFAULT 0,
            adaptations_failed INTEGER NOT NULL DEFAULT 0,
            tests_passed INTEGER NOT NULL DEFAULT 0,
            tests_failed INTEGER NOT NULL DEFAULT 0,
            errors_fixed INTEGER NOT NULL DEFAULT 0,
            critical_errors INTEGER NOT NULL DEFAULT 0,
            failure_stage TEXT,
            failure_message TEXT,
            started_at TEXT NOT NULL,
            ended_at TEXT NOT NULL,
            UNIQUE(run_id, cycle_number)
        );

        CREATE INDEX IF NOT EXISTS idx_devices_last_seen ON discovered_devices(last_seen);
        CREATE INDEX IF NOT EXISTS idx_devices_protocol ON discovered_devices(discovery_protocol);
        CREATE INDEX IF NOT EXISTS idx_adaptation_created ON adaptation_log(created_at);
        CREATE INDEX IF NOT EXISTS idx_cycles_run ON cycle_summaries(run_id, cycle_number);
        "#,
    )
    .context("Failed to create database tables")?;

    // Databases created before device locations were tracked.
    if !has_column(conn, "discovered_devices", "location")? {
        conn.execute("ALTER TABLE discovered_devices ADD COLUMN location TEXT", [])
            .context("Failed to migrate discovered_devices with location column")?;
    }

    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    conn.prepare(&format!("PRAGMA table_info({table})"))
        .and_then(|mut stmt| {
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let col_name: String = row.get(1)?;
                if col_name == column {
                    return Ok(true);
                }
            }
            Ok(false)
        })
        .with_context(|| format!("Failed to inspect {table} table schema"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tables_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
        assert!(has_column(&conn, "discovered_devices", "location").unwrap());
        assert!(!has_column(&conn, "discovered_devices", "mac").unwrap());
    }
}
