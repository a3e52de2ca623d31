//! CDP neighbors via a bounded `tcpdump` capture
//!
//! CDP frames go to the Cisco multicast MAC. `tcpdump` stops after one frame
//! or when the listen window closes; no frames in the window is a normal result.

use anyhow::Result;
use serde_json::json;
use std::future::Future;
use std::net::IpAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use super::tooling::{capture_tool, find_tool};
use super::{ProbeReport, ProtocolProbe};
use crate::config::cdp_capture_window;
use crate::log_debug;
use crate::models::{DiscoveredDevice, DiscoveryProtocol};
use crate::network::{ScanScope, classify_device_kind};

const TCPDUMP: &str = "tcpdump";
const CDP_FRAME_LIMIT: &str = "1";
const CDP_FILTER: &str = "ether dst 01:00:0c:cc:cc:cc";

#[derive(Default)]
struct CdpFrame {
    device_id: Option<String>,
    address: Option<IpAddr>,
    platform: Option<String>,
    capabilities: Option<String>,
}

impl CdpFrame {
    fn into_device(self) -> Option<DiscoveredDevice> {
        let mut device = DiscoveredDevice::new(self.address?, DiscoveryProtocol::Cdp);
        let hint = format!(
            "{} {}",
            self.platform.as_deref().unwrap_or_default(),
            self.capabilities.as_deref().unwrap_or_default()
        );
        device.device_kind = classify_device_kind(&hint);
        if let Some(name) = self.device_id {
            device.display_name = name;
        }
        device.description = self.platform;
        Some(device)
    }
}

fn quoted(line: &str) -> Option<String> {
    let start = line.find('\'')? + 1;
    let end = line[start..].find('\'')? + start;
    Some(line[start..end].to_string())
}

/// Parse `tcpdump -v` CDP decodes into devices
pub fn parse_cdp_verbose(output: &str) -> Vec<DiscoveredDevice> {
    let mut frames: Vec<CdpFrame> = Vec::new();

    for line in output.lines() {
        if line.contains("CDPv") {
            frames.push(CdpFrame::default());
            continue;
        }
        let Some(frame) = frames.last_mut() else {
            continue;
        };
        let field = line.trim_start();
        if field.starts_with("Device-ID") {
            frame.device_id = quoted(field);
        } else if field.starts_with("Address") && frame.address.is_none() {
            frame.address = field
                .split_once("IPv4 (1)")
                .and_then(|(_, ip)| ip.split_whitespace().next())
                .and_then(|ip| ip.parse().ok());
        } else if field.starts_with("Platform") {
            frame.platform = quoted(field);
        } else if field.starts_with("Capability") {
            frame.capabilities = field.rsplit_once(':').map(|(_, caps)| caps.trim().to_string());
        }
    }

    frames.into_iter().filter_map(CdpFrame::into_device).collect()
}

#[derive(Debug, Clone)]
pub struct CdpProbe {
    tool: Option<PathBuf>,
    window: Duration,
}

impl CdpProbe {
    pub fn new() -> Self {
        Self {
            tool: find_tool(TCPDUMP),
            window: cdp_capture_window(),
        }
    }

    /// Use a specific capture binary and listen window
    pub fn with_tool(tool: PathBuf, window: Duration) -> Self {
        Self {
            tool: Some(tool),
            window,
        }
    }

    async fn capture(&self) -> Result<ProbeReport> {
        let Some(tool) = &self.tool else {
            return Ok(ProbeReport::unavailable(DiscoveryProtocol::Cdp, "tcpdump not installed"));
        };

        // -l line-buffers stdout so a frame printed before the window closes is kept
        let args = ["-l", "-nn", "-v", "-c", CDP_FRAME_LIMIT, CDP_FILTER];
        let (devices, outcome) = match capture_tool(tool, &args, self.window).await {
            Ok(output) if output.trim().is_empty() => (Vec::new(), "no frames".to_string()),
            Ok(output) => (parse_cdp_verbose(&output), "captured".to_string()),
            Err(e) => {
                log_debug!("CDP capture failed: {}", e);
                (Vec::new(), e.to_string())
            }
        };

        let evidence = json!({
            "tool": tool.display().to_string(),
            "filter": CDP_FILTER,
            "neighbors": devices.len(),
            "outcome": outcome,
        });
        Ok(ProbeReport::new(DiscoveryProtocol::Cdp, devices, evidence))
    }
}

impl Default for CdpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolProbe for CdpProbe {
    fn protocol(&self) -> DiscoveryProtocol {
        DiscoveryProtocol::Cdp
    }

    fn is_available(&self) -> bool {
        self.tool.is_some()
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
    use crate::models::DeviceKind;

    const SAMPLE: &str = "\
12:00:01.000000 CDPv2, ttl: 180s, checksum: 0x1a2b (unverified), length 386
\tDevice-ID (0x01), value length: 11 bytes: 'core-switch'
\tAddress (0x02), value length: 13 bytes: IPv4 (1) 192.168.1.3
\tPort-ID (0x03), value length: 18 bytes: 'GigabitEthernet0/1'
\tCapability (0x04), value length: 4 bytes: (0x00000028): L2 Switch, IGMP snooping
\tPlatform (0x06), value length: 21 bytes: 'cisco WS-C2960-24TT-L'
12:00:31.000000 CDPv2, ttl: 180s, checksum: 0x1a2c (unverified), length 120
\tDevice-ID (0x01), value length: 6 bytes: 'no-ip'
";

    #[test]
    fn test_parses_frames_with_addresses() {
        let devices = parse_cdp_verbose(SAMPLE);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].address.to_string(), "192.168.1.3");
        assert_eq!(devices[0].display_name, "core-switch");
        assert_eq!(devices[0].device_kind, DeviceKind::Switch);
        assert_eq!(devices[0].description.as_deref(), Some("cisco WS-C2960-24TT-L"));
    }

    #[test]
    fn test_lines_before_first_frame_are_ignored() {
        assert!(parse_cdp_verbose("tcpdump: listening on eth0\n").is_empty());
    }

    /// Stand-in for tcpdump: prints one frame, then keeps listening
    #[cfg(unix)]
    #[tokio::test]
    async fn test_frame_seen_before_window_closes_is_kept() {
        use std::os::unix::fs::PermissionsExt;

        let script = std::env::temp_dir().join(format!("nexus-fake-tcpdump-{}", std::process::id()));
        let body = format!("#!/bin/sh\ncat <<'FRAME'\n{}FRAME\nexec sleep 30\n", SAMPLE);
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let scope = ScanScope::new("192.0.2.0/24".parse().unwrap(), None, vec!["public".to_string()], 254).unwrap();
        let probe = CdpProbe::with_tool(script.clone(), Duration::from_millis(800));
        let report = probe.discover(&scope).await.unwrap();
        std::fs::remove_file(&script).ok();

        assert!(report.available);
        assert_eq!(report.devices.len(), 1);
        assert_eq!(report.devices[0].display_name, "core-switch");
    }
}
