//! MNDP (MikroTik Neighbor Discovery Protocol) listener
//!
//! Passive capture of neighbor announcements on the MNDP UDP port for a
//! bounded window. Payloads are kept as an opaque hex preview; decoding the
//! TLVs is left to later analysis.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout_at};

use super::{ProbeReport, ProtocolProbe};
use crate::config::{MNDP_MAX_PACKETS, mndp_capture_window, mndp_port};
use crate::models::{DiscoveredDevice, DiscoveryProtocol};
use crate::network::ScanScope;
use crate::{log_debug, log_stderr};

const HEX_PREVIEW_BYTES: usize = 64;

/// Metadata of one captured announcement
#[derive(Debug, Clone, Serialize)]
pub struct MndpPacket {
    pub source: SocketAddr,
    pub length: usize,
    pub received_at: DateTime<Utc>,
    pub hex_preview: String,
}

impl MndpPacket {
    fn from_datagram(source: SocketAddr, payload: &[u8]) -> Self {
        let hex_preview = payload
            .iter()
            .take(HEX_PREVIEW_BYTES)
            .map(|b| format!("{:02x}", b))
            .collect();
        Self {
            source,
            length: payload.len(),
            received_at: Utc::now(),
            hex_preview,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MndpProbe {
    port: u16,
    window: Duration,
    max_packets: usize,
}

impl MndpProbe {
    pub fn new() -> Self {
        Self::with_settings(mndp_port(), mndp_capture_window(), MNDP_MAX_PACKETS)
    }

    pub fn with_settings(port: u16, window: Duration, max_packets: usize) -> Self {
        Self {
            port,
            window,
            max_packets: max_packets.max(1),
        }
    }

    async fn capture(&self) -> Result<ProbeReport> {
        let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port);
        let socket = match UdpSocket::bind(bind_addr).await {
            Ok(socket) => socket,
            Err(e) => {
                log_debug!("MNDP listener unavailable on {}: {}", bind_addr, e);
                return Ok(ProbeReport::unavailable(
                    DiscoveryProtocol::Mndp,
                    format!("cannot bind UDP {}: {}", self.port, e),
                ));
            }
        };

        let deadline = Instant::now() + self.window;
        let mut packets = Vec::new();
        let mut buf = vec![0u8; 1500];

        while packets.len() < self.max_packets {
            match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Ok(Ok((len, source))) => packets.push(MndpPacket::from_datagram(source, &buf[..len])),
                Ok(Err(e)) => {
                    log_debug!("MNDP receive error: {}", e);
                    break;
                }
                // window elapsed
                Err(_) => break,
            }
        }

        if !packets.is_empty() {
            log_stderr!("MNDP capture: {} announcements", packets.len());
        }

        // one device per announcing address, newest sighting wins
        let mut senders: BTreeMap<IpAddr, DateTime<Utc>> = BTreeMap::new();
        for packet in &packets {
            senders.insert(packet.source.ip(), packet.received_at);
        }
        let devices = senders
            .into_iter()
            .map(|(address, seen)| {
                let mut device = DiscoveredDevice::new(address, DiscoveryProtocol::Mndp);
                device.last_seen = seen;
                device
            })
            .collect();

        let evidence = json!({
            "port": self.port,
            "window_ms": self.window.as_millis() as u64,
            "packets": packets,
        });

        Ok(ProbeReport::new(DiscoveryProtocol::Mndp, devices, evidence))
    }
}

impl Default for MndpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolProbe for MndpProbe {
    fn protocol(&self) -> DiscoveryProtocol {
        DiscoveryProtocol::Mndp
    }

    fn discover<'a>(
        &'a self,
        _scope: &'a ScanScope,
    ) -> Pin<Box<dyn Future<Output = Result<ProbeReport>> + Send + 'a>> {
        Box::pin(self.capture())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> ScanScope {
        ScanScope::new("127.0.0.0/30".parse().unwrap(), None, vec!["public".to_string()], 254).unwrap()
    }

    async fn free_udp_port() -> u16 {
        let probe = UdpSocket::bind("0.0.0.0:0").await.unwrap();
        probe.local_addr().unwrap().port()
    }

    #[test]
    fn test_hex_preview_is_bounded() {
        let payload = vec![0xabu8; 200];
        let packet = MndpPacket::from_datagram("10.0.0.1:5678".parse().unwrap(), &payload);
        assert_eq!(packet.length, 200);
        assert_eq!(packet.hex_preview.len(), HEX_PREVIEW_BYTES * 2);
        assert!(packet.hex_preview.starts_with("abab"));
    }

    #[tokio::test]
    async fn test_captures_announcements_within_window() {
        let port = free_udp_port().await;
        let probe = MndpProbe::with_settings(port, Duration::from_millis(600), 8);

        let sender = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            socket
                .send_to(&[0x00, 0x01, 0x00, 0x05], ("127.0.0.1", port))
                .await
                .unwrap();
        });

        let scope = scope();
        let report = probe.discover(&scope).await.unwrap();
        sender.await.unwrap();

        assert!(report.available);
        assert_eq!(report.devices.len(), 1);
        assert_eq!(report.devices[0].address.to_string(), "127.0.0.1");
        assert_eq!(report.evidence["packets"][0]["hex_preview"], "00010005");
    }

    #[tokio::test]
    async fn test_busy_port_reports_unavailable() {
        let holder = UdpSocket::bind("0.0.0.0:0").await.unwrap();
        let port = holder.local_addr().unwrap().port();
        let probe = MndpProbe::with_settings(port, Duration::from_millis(100), 8);

        let scope = scope();
        let report = probe.discover(&scope).await.unwrap();
        assert!(!report.available);
        assert!(report.devices.is_empty());
    }
}
