//! Device-management collaborator
//!
//! Receives adaptation intents. Nothing here touches live infrastructure; the
//! SQLite manager queues intents in `adaptation_log` for whatever applies them.

use anyhow::{Result, anyhow, bail};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Mutex;

use crate::database::{AdaptationLogInsert, Database, queries};
use crate::models::FindingKind;

/// What should happen for one finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdaptationIntent {
    pub kind: FindingKind,
    pub feature: String,
    pub action: String,
    pub priority: u8,
}

pub trait DeviceManager: Send + Sync {
    /// Accept an intent; returns a short acknowledgement
    fn submit(&self, intent: &AdaptationIntent) -> Result<String>;
}

/// Queues intents in the research database
pub struct SqliteDeviceManager {
    db: Database,
}

impl SqliteDeviceManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl DeviceManager for SqliteDeviceManager {
    fn submit(&self, intent: &AdaptationIntent) -> Result<String> {
        let conn = self.db.lock()?;
        let id = queries::insert_adaptation_log(
            &conn,
            &AdaptationLogInsert {
                finding_kind: intent.kind.as_str(),
                feature: &intent.feature,
                action: &intent.action,
                priority: intent.priority,
                success: true,
                detail: Some("queued"),
            },
        )?;
        Ok(format!("queued as adaptation #{}", id))
    }
}

/// In-memory manager for test mode and tests; can be told to reject features
#[derive(Default)]
pub struct RecordingDeviceManager {
    accepted: Mutex<Vec<AdaptationIntent>>,
    rejected_features: HashSet<String>,
}

impl RecordingDeviceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(features: &[&str]) -> Self {
        Self {
            accepted: Mutex::new(Vec::new()),
            rejected_features: features.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn accepted(&self) -> Vec<AdaptationIntent> {
        self.accepted.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl DeviceManager for RecordingDeviceManager {
    fn submit(&self, intent: &AdaptationIntent) -> Result<String> {
        if self.rejected_features.contains(&intent.feature) {
            bail!("device manager rejected {}", intent.feature);
        }
        self.accepted
            .lock()
            .map_err(|_| anyhow!("Device manager lock poisoned"))?
            .push(intent.clone());
        Ok("recorded".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(feature: &str) -> AdaptationIntent {
        AdaptationIntent {
            kind: FindingKind::SnmpImprovement,
            feature: feature.to_string(),
            action: "enable-snmp-feature".to_string(),
            priority: 9,
        }
    }

    #[test]
    fn test_sqlite_manager_queues_intent() {
        let db = Database::in_memory().unwrap();
        let manager = SqliteDeviceManager::new(db.clone());

        let ack = manager.submit(&intent("snmp_v3")).unwrap();
        assert!(ack.starts_with("queued"));

        let conn = db.lock().unwrap();
        let rows = queries::get_recent_adaptations(&conn, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].feature, "snmp_v3");
        assert_eq!(rows[0].finding_kind, "snmp-improvement");
    }

    #[test]
    fn test_recording_manager_rejects_configured_features() {
        let manager = RecordingDeviceManager::rejecting(&["cdp_integration"]);
        assert!(manager.submit(&intent("cdp_integration")).is_err());
        assert!(manager.submit(&intent("snmp_v3")).is_ok());
        assert_eq!(manager.accepted().len(), 1);
    }
}
