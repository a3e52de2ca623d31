//! Database models
//!
//! Record and filter types for the research store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{DeviceKind, DeviceStatus, DiscoveryProtocol};

/// Filter for registry listings; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    pub protocol: Option<DiscoveryProtocol>,
    pub kind: Option<DeviceKind>,
    pub status: Option<DeviceStatus>,
    pub seen_since: Option<DateTime<Utc>>,
}

impl DeviceFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn protocol(mut self, protocol: DiscoveryProtocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn kind(mut self, kind: DeviceKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn status(mut self, status: DeviceStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn seen_since(mut self, since: DateTime<Utc>) -> Self {
        self.seen_since = Some(since);
        self
    }
}

/// Research cache row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub topic: String,
    pub research_data: Option<serde_json::Value>,
    pub last_computed_at: DateTime<Utc>,
}

/// Adaptation log row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationLogRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub finding_kind: String,
    pub feature: String,
    pub action: String,
    pub priority: i32,
    pub success: bool,
    pub detail: Option<String>,
}
