//! Device registry
//!
//! One row per network address. Re-discovery upserts rather than inserts, and
//! nothing here ever deletes a device.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;

use crate::database::{Database, DeviceFilter, queries};
use crate::models::{DeviceKind, DeviceStatus, DiscoveredDevice};

/// Storage contract for discovered devices
pub trait DeviceRegistry: Send + Sync {
    /// Insert or refresh a device keyed by its address
    fn upsert(&self, device: &DiscoveredDevice) -> Result<()>;

    /// Devices matching `filter`, most recently seen first
    fn list(&self, filter: &DeviceFilter) -> Result<Vec<DiscoveredDevice>>;

    /// Flag devices unseen since `cutoff`; returns how many changed
    fn mark_stale(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// SQLite-backed registry
pub struct SqliteRegistry {
    db: Database,
}

impl SqliteRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl DeviceRegistry for SqliteRegistry {
    fn upsert(&self, device: &DiscoveredDevice) -> Result<()> {
        let conn = self.db.lock()?;
        queries::upsert_device(&conn, device)
    }

    fn list(&self, filter: &DeviceFilter) -> Result<Vec<DiscoveredDevice>> {
        let conn = self.db.lock()?;
        queries::list_devices(&conn, filter)
    }

    fn mark_stale(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.db.lock()?;
        queries::mark_stale_devices(&conn, &cutoff)
    }
}

/// In-memory registry for test mode and tests
#[derive(Default)]
pub struct MemoryRegistry {
    devices: Mutex<HashMap<IpAddr, DiscoveredDevice>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceRegistry for MemoryRegistry {
    fn upsert(&self, device: &DiscoveredDevice) -> Result<()> {
        let mut devices = self
            .devices
            .lock()
            .map_err(|_| anyhow!("Registry lock poisoned"))?;

        match devices.get_mut(&device.address) {
            Some(existing) => merge_sighting(existing, device),
            None => {
                devices.insert(device.address, device.clone());
            }
        }
        Ok(())
    }

    fn list(&self, filter: &DeviceFilter) -> Result<Vec<DiscoveredDevice>> {
        let devices = self
            .devices
            .lock()
            .map_err(|_| anyhow!("Registry lock poisoned"))?;

        let mut matching: Vec<DiscoveredDevice> = devices
            .values()
            .filter(|d| filter.protocol.is_none_or(|p| d.discovery_protocol == p))
            .filter(|d| filter.kind.is_none_or(|k| d.device_kind == k))
            .filter(|d| filter.status.is_none_or(|s| d.status == s))
            .filter(|d| filter.seen_since.is_none_or(|since| d.last_seen >= since))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.last_seen
                .cmp(&a.last_seen)
                .then_with(|| a.address.cmp(&b.address))
        });
        Ok(matching)
    }

    fn mark_stale(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut devices = self
            .devices
            .lock()
            .map_err(|_| anyhow!("Registry lock poisoned"))?;

        let mut changed = 0;
        for device in devices.values_mut() {
            if device.status == DeviceStatus::Active && device.last_seen < cutoff {
                device.status = DeviceStatus::Stale;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

/// Same merge rules as the SQLite upsert
fn merge_sighting(existing: &mut DiscoveredDevice, seen: &DiscoveredDevice) {
    if seen.hardware_id.is_some() {
        existing.hardware_id = seen.hardware_id.clone();
    }
    if !seen.has_placeholder_name() {
        existing.display_name = seen.display_name.clone();
    }
    if seen.device_kind != DeviceKind::Unknown {
        existing.device_kind = seen.device_kind;
    }
    existing.discovery_protocol = seen.discovery_protocol;
    if seen.credentials_used.is_some() {
        existing.credentials_used = seen.credentials_used.clone();
    }
    if seen.description.is_some() {
        existing.description = seen.description.clone();
    }
    if seen.location.is_some() {
        existing.location = seen.location.clone();
    }
    existing.last_seen = existing.last_seen.max(seen.last_seen);
    existing.status = seen.status;
}
