//! Database query functions
//!
//! Upserts and listings for devices, the research cache, adaptations and cycles

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::net::IpAddr;

use super::models::*;
use crate::models::{CycleSummary, DiscoveredDevice};

/// Parameters used to insert an adaptation log row.
pub struct AdaptationLogInsert<'a> {
    pub finding_kind: &'a str,
    pub feature: &'a str,
    pub action: &'a str,
    pub priority: u8,
    pub success: bool,
    pub detail: Option<&'a str>,
}

/// Fixed-width RFC 3339 so stored timestamps compare lexicographically
pub fn format_datetime(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Insert or update a device keyed by address
///
/// A re-discovery refreshes `last_seen`, protocol metadata and status; optional
/// fields only overwrite when the new sighting carries a value, and a name
/// that is just the address never replaces a learned one.
pub fn upsert_device(conn: &Connection, device: &DiscoveredDevice) -> Result<()> {
    let credentials = device
        .credentials_used
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .context("Failed to encode device credentials")?;
    let seen = format_datetime(&device.last_seen);

    conn.execute(
        r#"
        INSERT INTO discovered_devices (
            address, hardware_id, display_name, device_kind, discovery_protocol,
            credentials, description, location, first_seen, last_seen, status
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, ?10)
        ON CONFLICT(address) DO UPDATE SET
            hardware_id = COALESCE(excluded.hardware_id, hardware_id),
            display_name = CASE
                WHEN excluded.display_name = excluded.address THEN display_name
                ELSE excluded.display_name
            END,
            device_kind = CASE
                WHEN excluded.device_kind = 'unknown' THEN device_kind
                ELSE excluded.device_kind
            END,
            discovery_protocol = excluded.discovery_protocol,
            credentials = COALESCE(excluded.credentials, credentials),
            description = COALESCE(excluded.description, description),
            location = COALESCE(excluded.location, location),
            last_seen = MAX(last_seen, excluded.last_seen),
            status = excluded.status
        "#,
        params![
            device.address.to_string(),
            &device.hardware_id,
            &device.display_name,
            device.device_kind.as_str(),
            device.discovery_protocol.as_str(),
            credentials,
            &device.description,
            &device.location,
            seen,
            device.status.as_str(),
        ],
    )
    .with_context(|| format!("Failed to upsert device {}", device.address))?;

    Ok(())
}

/// List devices matching a filter, most recently seen first
pub fn list_devices(conn: &Connection, filter: &DeviceFilter) -> Result<Vec<DiscoveredDevice>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<String> = Vec::new();

    if let Some(protocol) = filter.protocol {
        clauses.push("discovery_protocol = ?");
        values.push(protocol.as_str().to_string());
    }
    if let Some(kind) = filter.kind {
        clauses.push("device_kind = ?");
        values.push(kind.as_str().to_string());
    }
    if let Some(status) = filter.status {
        clauses.push("status = ?");
        values.push(status.as_str().to_string());
    }
    if let Some(since) = filter.seen_since {
        clauses.push("last_seen >= ?");
        values.push(format_datetime(&since));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let sql = format!(
        r#"
        SELECT address, hardware_id, display_name, device_kind, discovery_protocol,
               credentials, description, location, last_seen, status
        FROM discovered_devices
        {where_clause}
        ORDER BY last_seen DESC, address ASC
        "#
    );

    let mut stmt = conn.prepare(&sql).context("Failed to prepare device listing")?;
    let devices = stmt
        .query_map(params_from_iter(values.iter()), row_to_device)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to list devices")?;

    Ok(devices)
}

/// Get a device by address
pub fn get_device(conn: &Connection, address: IpAddr) -> Result<Option<DiscoveredDevice>> {
    conn.query_row(
        r#"
        SELECT address, hardware_id, display_name, device_kind, discovery_protocol,
               credentials, description, location, last_seen, status
        FROM discovered_devices
        WHERE address = ?1
        "#,
        params![address.to_string()],
        row_to_device,
    )
    .optional()
    .context("Failed to load device")
}

/// Mark devices not seen since `cutoff` as stale; returns rows changed
pub fn mark_stale_devices(conn: &Connection, cutoff: &DateTime<Utc>) -> Result<usize> {
    let changed = conn
        .execute(
            "UPDATE discovered_devices SET status = 'stale' WHERE status = 'active' AND last_seen < ?1",
            params![format_datetime(cutoff)],
        )
        .context("Failed to mark stale devices")?;
    Ok(changed)
}

/// Count registry rows
pub fn count_devices(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM discovered_devices", [], |row| row.get(0))
        .context("Failed to count devices")
}

/// Read a research cache row
pub fn get_cache_entry(conn: &Connection, topic: &str) -> Result<Option<CacheRecord>> {
    conn.query_row(
        "SELECT topic, research_data, last_computed_at FROM research_cache WHERE topic = ?1",
        params![topic],
        |row| {
            let data: Option<String> = row.get(1)?;
            Ok(CacheRecord {
                topic: row.get(0)?,
                research_data: data.and_then(|raw| serde_json::from_str(&raw).ok()),
                last_computed_at: parse_datetime_column(row.get::<_, String>(2)?, 2)?,
            })
        },
    )
    .optional()
    .context("Failed to read research cache")
}

/// Upsert a research cache row
pub fn put_cache_entry(
    conn: &Connection,
    topic: &str,
    data: Option<&serde_json::Value>,
    at: &DateTime<Utc>,
) -> Result<()> {
    let encoded = data
        .map(serde_json::to_string)
        .transpose()
        .context("Failed to encode research data")?;

    conn.execute(
        r#"
        INSERT INTO research_cache (topic, research_data, last_computed_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(topic) DO UPDATE SET
            research_data = COALESCE(excluded.research_data, research_data),
            last_computed_at = excluded.last_computed_at
        "#,
        params![topic, encoded, format_datetime(at)],
    )
    .with_context(|| format!("Failed to write research cache topic {}", topic))?;

    Ok(())
}

/// Append an adaptation intent and its outcome
pub fn insert_adaptation_log(conn: &Connection, entry: &AdaptationLogInsert<'_>) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO adaptation_log (created_at, finding_kind, feature, action, priority, success, detail)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            format_datetime(&Utc::now()),
            entry.finding_kind,
            entry.feature,
            entry.action,
            entry.priority as i32,
            entry.success,
            entry.detail,
        ],
    )
    .context("Failed to insert adaptation log entry")?;

    Ok(conn.last_insert_rowid())
}

/// Most recent adaptation log entries
pub fn get_recent_adaptations(conn: &Connection, limit: i32) -> Result<Vec<AdaptationLogRecord>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, created_at, finding_kind, feature, action, priority, success, detail
        FROM adaptation_log
        ORDER BY id DESC
        LIMIT ?1
        "#,
    )?;

    let entries = stmt
        .query_map(params![limit], |row| {
            Ok(AdaptationLogRecord {
                id: row.get(0)?,
                created_at: parse_datetime_column(row.get::<_, String>(1)?, 1)?,
                finding_kind: row.get(2)?,
                feature: row.get(3)?,
                action: row.get(4)?,
                priority: row.get(5)?,
                success: row.get(6)?,
                detail: row.get(7)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(entries)
}

/// Append a cycle summary for a run
pub fn insert_cycle_summary(conn: &Connection, run_id: &str, summary: &CycleSummary) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO cycle_summaries (
            run_id, cycle_number, findings_count, adaptations_count, adaptations_failed,
            tests_passed, tests_failed, errors_fixed, critical_errors,
            failure_stage, failure_message, started_at, ended_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
        params![
            run_id,
            summary.cycle_number,
            summary.findings_count as i64,
            summary.adaptations_count as i64,
            summary.adaptations_failed as i64,
            summary.tests_passed,
            summary.tests_failed,
            summary.errors_fixed,
            summary.critical_errors,
            summary.failure.as_ref().map(|f| f.stage.to_string()),
            summary.failure.as_ref().map(|f| f.message.clone()),
            format_datetime(&summary.started_at),
            format_datetime(&summary.ended_at),
        ],
    )
    .with_context(|| format!("Failed to append summary for cycle {}", summary.cycle_number))?;

    Ok(conn.last_insert_rowid())
}

/// Cycle numbers recorded for a run, in insertion order
pub fn get_cycle_numbers(conn: &Connection, run_id: &str) -> Result<Vec<u32>> {
    let mut stmt =
        conn.prepare("SELECT cycle_number FROM cycle_summaries WHERE run_id = ?1 ORDER BY id ASC")?;
    let numbers = stmt
        .query_map(params![run_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<u32>>>()?;
    Ok(numbers)
}

fn row_to_device(row: &rusqlite::Row<'_>) -> rusqlite::Result<DiscoveredDevice> {
    let address: String = row.get(0)?;
    let kind: String = row.get(3)?;
    let protocol: String = row.get(4)?;
    let credentials: Option<String> = row.get(5)?;
    let status: String = row.get(9)?;

    Ok(DiscoveredDevice {
        address: address
            .parse()
            .map_err(|e| conversion_error(0, format!("invalid address '{}': {}", address, e)))?,
        hardware_id: row.get(1)?,
        display_name: row.get(2)?,
        device_kind: kind.parse().unwrap_or(crate::models::DeviceKind::Unknown),
        discovery_protocol: protocol.parse().map_err(|e: String| conversion_error(4, e))?,
        credentials_used: credentials.and_then(|raw| serde_json::from_str(&raw).ok()),
        description: row.get(6)?,
        location: row.get(7)?,
        last_seen: parse_datetime_column(row.get::<_, String>(8)?, 8)?,
        status: status.parse().unwrap_or(crate::models::DeviceStatus::Active),
    })
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn parse_datetime_column(s: String, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::models::{Credentials, DeviceKind, DeviceStatus, DiscoveryProtocol};
    use chrono::Duration;

    fn snmp_device(ip: &str, seen: DateTime<Utc>) -> DiscoveredDevice {
        let mut device = DiscoveredDevice::new(ip.parse().unwrap(), DiscoveryProtocol::Snmp);
        device.display_name = "core-sw".to_string();
        device.device_kind = DeviceKind::Switch;
        device.credentials_used = Some(Credentials::Snmp {
            community: "public".to_string(),
            version: "v2c".to_string(),
        });
        device.last_seen = seen;
        device
    }

    #[test]
    fn test_upsert_keeps_single_row_and_advances_last_seen() {
        let db = Database::in_memory().unwrap();
        let conn = db.lock().unwrap();
        let t0 = Utc::now() - Duration::minutes(5);

        upsert_device(&conn, &snmp_device("10.0.0.2", t0)).unwrap();
        upsert_device(&conn, &snmp_device("10.0.0.2", t0 + Duration::minutes(2))).unwrap();

        assert_eq!(count_devices(&conn).unwrap(), 1);
        let stored = get_device(&conn, "10.0.0.2".parse().unwrap()).unwrap().unwrap();
        assert_eq!(
            format_datetime(&stored.last_seen),
            format_datetime(&(t0 + Duration::minutes(2)))
        );
        assert_eq!(stored.device_kind, DeviceKind::Switch);
    }

    #[test]
    fn test_upsert_keeps_known_kind_when_resighted_as_unknown() {
        let db = Database::in_memory().unwrap();
        let conn = db.lock().unwrap();
        let now = Utc::now();

        upsert_device(&conn, &snmp_device("10.0.0.3", now)).unwrap();
        let mut mndp = DiscoveredDevice::new("10.0.0.3".parse().unwrap(), DiscoveryProtocol::Mndp);
        mndp.last_seen = now + Duration::seconds(1);
        upsert_device(&conn, &mndp).unwrap();

        let stored = get_device(&conn, "10.0.0.3".parse().unwrap()).unwrap().unwrap();
        assert_eq!(stored.device_kind, DeviceKind::Switch);
        assert_eq!(stored.display_name, "core-sw");
        assert_eq!(stored.discovery_protocol, DiscoveryProtocol::Mndp);
        assert!(stored.credentials_used.is_some());
    }

    #[test]
    fn test_list_devices_filters_by_protocol_and_status() {
        let db = Database::in_memory().unwrap();
        let conn = db.lock().unwrap();
        let now = Utc::now();

        upsert_device(&conn, &snmp_device("10.0.0.4", now - Duration::hours(2))).unwrap();
        let mut lldp = DiscoveredDevice::new("10.0.0.5".parse().unwrap(), DiscoveryProtocol::Lldp);
        lldp.last_seen = now;
        upsert_device(&conn, &lldp).unwrap();

        let stale = mark_stale_devices(&conn, &(now - Duration::minutes(30))).unwrap();
        assert_eq!(stale, 1);

        let snmp_only =
            list_devices(&conn, &DeviceFilter::all().protocol(DiscoveryProtocol::Snmp)).unwrap();
        assert_eq!(snmp_only.len(), 1);
        assert_eq!(snmp_only[0].status, DeviceStatus::Stale);

        let active = list_devices(&conn, &DeviceFilter::all().status(DeviceStatus::Active)).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].discovery_protocol, DiscoveryProtocol::Lldp);
    }

    #[test]
    fn test_cache_entry_upsert_overwrites_timestamp() {
        let db = Database::in_memory().unwrap();
        let conn = db.lock().unwrap();
        let t0 = Utc::now() - Duration::hours(2);
        let data = serde_json::json!({"probe": "snmp"});

        put_cache_entry(&conn, "snmp_v3", Some(&data), &t0).unwrap();
        put_cache_entry(&conn, "snmp_v3", None, &(t0 + Duration::hours(1))).unwrap();

        let entry = get_cache_entry(&conn, "snmp_v3").unwrap().unwrap();
        assert_eq!(entry.research_data, Some(data));
        assert_eq!(
            format_datetime(&entry.last_computed_at),
            format_datetime(&(t0 + Duration::hours(1)))
        );
        assert!(get_cache_entry(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_adaptation_log_round_trip() {
        let db = Database::in_memory().unwrap();
        let conn = db.lock().unwrap();

        let id = insert_adaptation_log(
            &conn,
            &AdaptationLogInsert {
                finding_kind: "snmp-improvement",
                feature: "snmp_v3",
                action: "enable SNMPv3 polling",
                priority: 9,
                success: true,
                detail: None,
            },
        )
        .unwrap();
        assert!(id > 0);

        let recent = get_recent_adaptations(&conn, 5).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].feature, "snmp_v3");
        assert!(recent[0].success);
    }
}
