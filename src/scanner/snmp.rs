//! SNMP community sweep
//!
//! Queries every address in the scope with each community string in order
//! (SNMPv2c). A host counts as found when sysDescr answers:
//! - sysDescr (1.3.6.1.2.1.1.1.0) - System description, drives classification
//! - sysName (1.3.6.1.2.1.1.5.0) - Display name
//! - sysLocation (1.3.6.1.2.1.1.6.0) - Physical location

use anyhow::Result;
use serde_json::json;
use snmp2::{AsyncSession, Oid, Value};
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::timeout;

use super::{ProbeReport, ProtocolProbe};
use crate::config::{max_concurrent_snmp, snmp_port, snmp_timeout};
use crate::models::{Credentials, DiscoveredDevice, DiscoveryProtocol};
use crate::network::{ScanScope, classify_device_kind};
use crate::{log_debug, log_stderr, log_warn};

/// Common SNMP OID arrays (u64 type required by snmp2)
const OID_SYS_DESCR: &[u64] = &[1, 3, 6, 1, 2, 1, 1, 1, 0];
const OID_SYS_NAME: &[u64] = &[1, 3, 6, 1, 2, 1, 1, 5, 0];
const OID_SYS_LOCATION: &[u64] = &[1, 3, 6, 1, 2, 1, 1, 6, 0];

const MAX_DESCRIPTION_CHARS: usize = 200;

/// What one host answered for one community
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnmpReply {
    pub community: String,
    pub description: String,
    pub name: Option<String>,
    pub location: Option<String>,
}

async fn get_string(session: &mut AsyncSession, oid: &[u64], limit: Duration) -> Option<String> {
    let oid = Oid::from(oid).ok()?;
    let Ok(Ok(mut response)) = timeout(limit, session.get(&oid)).await else {
        return None;
    };
    let Some((_, Value::OctetString(bytes))) = response.varbinds.next() else {
        return None;
    };
    let text = String::from_utf8_lossy(bytes).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn truncate_description(descr: String) -> String {
    if descr.chars().count() <= MAX_DESCRIPTION_CHARS {
        return descr;
    }
    let mut short: String = descr.chars().take(MAX_DESCRIPTION_CHARS).collect();
    short.push_str("...");
    short
}

/// Query a single host with one community; `None` on silence or timeout
pub async fn query_host_snmp(
    ip: Ipv4Addr,
    port: u16,
    limit: Duration,
    community: &str,
) -> Option<SnmpReply> {
    let addr = format!("{}:{}", ip, port);

    let mut session = match timeout(limit, AsyncSession::new_v2c(&addr, community.as_bytes(), 0)).await {
        Ok(Ok(s)) => s,
        _ => return None,
    };

    let description = get_string(&mut session, OID_SYS_DESCR, limit).await?;
    let name = get_string(&mut session, OID_SYS_NAME, limit).await;
    let location = get_string(&mut session, OID_SYS_LOCATION, limit).await;

    Some(SnmpReply {
        community: community.to_string(),
        description: truncate_description(description),
        name,
        location,
    })
}

fn device_from_reply(ip: Ipv4Addr, reply: SnmpReply) -> DiscoveredDevice {
    let mut device = DiscoveredDevice::new(IpAddr::V4(ip), DiscoveryProtocol::Snmp);
    device.device_kind = classify_device_kind(&reply.description);
    if let Some(name) = reply.name {
        device.display_name = name;
    }
    device.description = Some(reply.description);
    device.location = reply.location;
    device.credentials_used = Some(Credentials::Snmp {
        community: reply.community,
        version: "v2c".to_string(),
    });
    device
}

/// Communities are tried in order; the first that answers wins
async fn sweep_host(
    ip: Ipv4Addr,
    port: u16,
    limit: Duration,
    communities: &[String],
) -> Option<DiscoveredDevice> {
    for community in communities {
        if let Some(reply) = query_host_snmp(ip, port, limit, community).await {
            return Some(device_from_reply(ip, reply));
        }
    }
    None
}

/// Bounded-concurrency SNMPv2c sweep over the scan scope
#[derive(Debug, Clone)]
pub struct SnmpProbe {
    port: u16,
    timeout: Duration,
    concurrency: usize,
}

impl SnmpProbe {
    pub fn new() -> Self {
        Self::with_settings(snmp_port(), snmp_timeout(), max_concurrent_snmp())
    }

    pub fn with_settings(port: u16, timeout: Duration, concurrency: usize) -> Self {
        Self {
            port,
            timeout,
            concurrency: concurrency.max(1),
        }
    }

    async fn sweep(&self, scope: &ScanScope) -> Result<ProbeReport> {
        scope.validate()?;

        let hosts = scope.addresses();
        let communities = Arc::new(scope.communities().to_vec());

        log_stderr!(
            "SNMP sweep: {} hosts x {} communities on {}",
            hosts.len(),
            communities.len(),
            scope.network()
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let results = Arc::new(Mutex::new(Vec::new()));
        let port = self.port;
        let limit = self.timeout;

        let mut handles = Vec::with_capacity(hosts.len());

        for &ip in &hosts {
            let semaphore = Arc::clone(&semaphore);
            let results = Arc::clone(&results);
            let communities = Arc::clone(&communities);

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        log_warn!("SNMP semaphore acquire failed for {}: {}", ip, e);
                        return;
                    }
                };

                if let Some(device) = sweep_host(ip, port, limit, &communities).await {
                    log_debug!("SNMP response from {} ({})", ip, device.device_kind);
                    results.lock().await.push(device);
                }
            });

            handles.push(handle);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                log_warn!("SNMP task failed: {}", e);
            }
        }

        let mut devices = std::mem::take(&mut *results.lock().await);
        devices.sort_by_key(|d| d.address);

        log_stderr!("SNMP sweep complete: {} hosts responded", devices.len());

        let evidence = json!({
            "network": scope.network().to_string(),
            "hosts_swept": hosts.len(),
            "communities_tried": communities.len(),
            "responders": devices.len(),
            "version": "v2c",
        });

        Ok(ProbeReport::new(DiscoveryProtocol::Snmp, devices, evidence))
    }
}

impl Default for SnmpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolProbe for SnmpProbe {
    fn protocol(&self) -> DiscoveryProtocol {
        DiscoveryProtocol::Snmp
    }

    fn discover<'a>(
        &'a self,
        scope: &'a ScanScope,
    ) -> Pin<Box<dyn Future<Output = Result<ProbeReport>> + Send + 'a>> {
        Box::pin(self.sweep(scope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceKind;

    #[test]
    fn test_device_from_reply_classifies_and_records_credentials() {
        let device = device_from_reply(
            Ipv4Addr::new(192, 168, 88, 1),
            SnmpReply {
                community: "private".to_string(),
                description: "RouterOS CCR1009".to_string(),
                name: Some("core-gw".to_string()),
                location: Some("rack 2".to_string()),
            },
        );

        assert_eq!(device.device_kind, DeviceKind::Router);
        assert_eq!(device.display_name, "core-gw");
        assert_eq!(device.location.as_deref(), Some("rack 2"));
        assert_eq!(
            device.credentials_used,
            Some(Credentials::Snmp {
                community: "private".to_string(),
                version: "v2c".to_string(),
            })
        );
    }

    #[test]
    fn test_long_descriptions_are_truncated_on_char_boundary() {
        let long = "é".repeat(300);
        let short = truncate_description(long);
        assert_eq!(short.chars().count(), MAX_DESCRIPTION_CHARS + 3);
    }

    #[tokio::test]
    async fn test_silent_host_is_not_found() {
        // bound but never answers
        let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();

        let reply = query_host_snmp(Ipv4Addr::LOCALHOST, port, Duration::from_millis(150), "public").await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_sweep_of_silent_range_is_empty_not_error() {
        let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();
        let scope = ScanScope::new(
            "127.0.0.0/30".parse().unwrap(),
            None,
            vec!["public".to_string(), "private".to_string()],
            254,
        )
        .unwrap();

        let probe = SnmpProbe::with_settings(port, Duration::from_millis(100), 4);
        let report = probe.discover(&scope).await.unwrap();

        assert!(report.available);
        assert!(report.devices.is_empty());
        assert_eq!(report.evidence["hosts_swept"], 2);
    }
}
