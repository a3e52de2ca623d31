//! Configuration constants and runtime overrides for the research loop

use std::time::Duration;

// ====== Cycle Configuration ======

/// Default number of research cycles per run
pub const MAX_CYCLES: u32 = 10;

/// Delay between productive cycles in seconds
pub const CYCLE_DELAY_SECS: u64 = 60;

/// Productive-to-empty delay ratio (an empty cycle waits half as long)
pub const EMPTY_CYCLE_DELAY_DIVISOR: u64 = 2;

/// Findings at or above this priority are promoted to adaptation
pub const ADAPTATION_PRIORITY_THRESHOLD: u8 = 7;

/// Highest priority a finding may carry
pub const MAX_FINDING_PRIORITY: u8 = 10;

// ====== Research Cache Configuration ======

/// Dedup window for feature-level topics (1 hour)
pub const FEATURE_CACHE_WINDOW_SECS: u64 = 3600;

/// Dedup window for behavior-pattern topics (30 minutes)
pub const BEHAVIOR_CACHE_WINDOW_SECS: u64 = 1800;

// ====== SNMP Configuration ======

/// Community strings tried against every address, in order
pub const SNMP_COMMUNITIES: &[&str] = &["public", "private", "community", "admin"];

/// Communities appended one at a time when the scope is widened
pub const SNMP_FALLBACK_COMMUNITIES: &[&str] = &["monitor", "manager", "snmp", "read"];

/// SNMP query timeout
pub const SNMP_TIMEOUT: Duration = Duration::from_millis(1500);

/// SNMP port
pub const SNMP_PORT: u16 = 161;

/// Maximum concurrent SNMP host queries
pub const MAX_CONCURRENT_SNMP: usize = 32;

// ====== Scan Scope Configuration ======

/// Default subnet prefix length when no interface provides one
pub const DEFAULT_PREFIX_LEN: u8 = 24;

/// Scope expansion never widens past this prefix
pub const MIN_SCOPE_PREFIX_LEN: u8 = 22;

/// Maximum hosts swept per cycle (254 = one /24)
pub const MAX_SCAN_HOSTS: usize = 254;

/// Fallback subnet when no usable interface is found
pub const FALLBACK_SUBNET: &str = "192.168.1.0/24";

// ====== Neighbor Discovery Configuration ======

/// Well-known MNDP broadcast port
pub const MNDP_PORT: u16 = 5678;

/// Passive MNDP capture window per cycle
pub const MNDP_CAPTURE_WINDOW: Duration = Duration::from_millis(3000);

/// Maximum MNDP packets kept per capture window
pub const MNDP_MAX_PACKETS: usize = 64;

/// Timeout for external LLDP/CDP tooling
pub const TOOL_TIMEOUT: Duration = Duration::from_millis(3000);

/// How long `tcpdump` listens for a CDP frame; switches announce every 60s
pub const CDP_CAPTURE_WINDOW: Duration = Duration::from_millis(5000);

// ====== Safety & Registry Configuration ======

/// Minutes without sightings before a device is marked stale
pub const DEVICE_STALE_MINUTES: i64 = 30;

/// Consecutive failing cycles that the Verify stage treats as critical
pub const CRITICAL_FAILURE_STREAK: u32 = 3;

/// Rows printed by `devices` unless `--limit` is given
pub const DEFAULT_DEVICE_LIST_LIMIT: usize = 100;

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse_u64(name: &str, default: u64, min: u64, max: u64) -> u64 {
    match env_var(name).and_then(|v| v.parse::<u64>().ok()) {
        Some(v) => v.clamp(min, max),
        None => default,
    }
}

fn env_parse_u32(name: &str, default: u32, min: u32, max: u32) -> u32 {
    match env_var(name).and_then(|v| v.parse::<u32>().ok()) {
        Some(v) => v.clamp(min, max),
        None => default,
    }
}

fn env_parse_usize(name: &str, default: usize, min: usize, max: usize) -> usize {
    match env_var(name).and_then(|v| v.parse::<usize>().ok()) {
        Some(v) => v.clamp(min, max),
        None => default,
    }
}

fn env_parse_u16(name: &str, default: u16, min: u16, max: u16) -> u16 {
    match env_var(name).and_then(|v| v.parse::<u16>().ok()) {
        Some(v) => v.clamp(min, max),
        None => default,
    }
}

fn env_parse_i64(name: &str, default: i64, min: i64, max: i64) -> i64 {
    match env_var(name).and_then(|v| v.parse::<i64>().ok()) {
        Some(v) => v.clamp(min, max),
        None => default,
    }
}

/// Runtime-tunable cycle budget.
/// Env: `NEXUS_MAX_CYCLES`
pub fn max_cycles() -> u32 {
    env_parse_u32("NEXUS_MAX_CYCLES", MAX_CYCLES, 1, 10_000)
}

/// Runtime-tunable delay between productive cycles.
/// Env: `NEXUS_CYCLE_DELAY_SECS`
pub fn cycle_delay() -> Duration {
    Duration::from_secs(env_parse_u64(
        "NEXUS_CYCLE_DELAY_SECS",
        CYCLE_DELAY_SECS,
        0,
        86_400,
    ))
}

/// Explicit empty-cycle delay, if configured. `LoopSettings` derives half
/// the cycle delay otherwise.
/// Env: `NEXUS_EMPTY_CYCLE_DELAY_SECS`
pub fn empty_cycle_delay_override() -> Option<Duration> {
    env_var("NEXUS_EMPTY_CYCLE_DELAY_SECS")
        .and_then(|v| v.parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs.min(86_400)))
}

/// Runtime-tunable feature-topic dedup window.
/// Env: `NEXUS_FEATURE_CACHE_WINDOW_SECS`
pub fn feature_cache_window() -> Duration {
    Duration::from_secs(env_parse_u64(
        "NEXUS_FEATURE_CACHE_WINDOW_SECS",
        FEATURE_CACHE_WINDOW_SECS,
        1,
        604_800,
    ))
}

/// Runtime-tunable behavior-pattern dedup window.
/// Env: `NEXUS_BEHAVIOR_CACHE_WINDOW_SECS`
pub fn behavior_cache_window() -> Duration {
    Duration::from_secs(env_parse_u64(
        "NEXUS_BEHAVIOR_CACHE_WINDOW_SECS",
        BEHAVIOR_CACHE_WINDOW_SECS,
        1,
        604_800,
    ))
}

/// Runtime-tunable SNMP community list.
/// Env: `NEXUS_SNMP_COMMUNITIES` (comma-separated, e.g. `public,private`)
pub fn snmp_communities() -> Vec<String> {
    if let Some(raw) = env_var("NEXUS_SNMP_COMMUNITIES") {
        let communities: Vec<String> = raw
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if !communities.is_empty() {
            return communities;
        }
    }
    SNMP_COMMUNITIES.iter().map(|c| c.to_string()).collect()
}

/// Runtime-tunable SNMP timeout.
/// Env: `NEXUS_SNMP_TIMEOUT_MS`
pub fn snmp_timeout() -> Duration {
    Duration::from_millis(env_parse_u64(
        "NEXUS_SNMP_TIMEOUT_MS",
        SNMP_TIMEOUT.as_millis() as u64,
        100,
        3_000,
    ))
}

/// Runtime-tunable SNMP port.
/// Env: `NEXUS_SNMP_PORT`
pub fn snmp_port() -> u16 {
    env_parse_u16("NEXUS_SNMP_PORT", SNMP_PORT, 1, u16::MAX)
}

/// Runtime-tunable SNMP worker pool size.
/// Env: `NEXUS_MAX_CONCURRENT_SNMP`
pub fn max_concurrent_snmp() -> usize {
    env_parse_usize("NEXUS_MAX_CONCURRENT_SNMP", MAX_CONCURRENT_SNMP, 1, 256)
}

/// Optional subnet override for the SNMP sweep.
/// Env: `NEXUS_SCAN_SUBNET` (e.g. `10.0.0.0/24`)
pub fn scan_subnet_override() -> Option<String> {
    env_var("NEXUS_SCAN_SUBNET")
}

/// Runtime-tunable host cap for the SNMP sweep.
/// Env: `NEXUS_MAX_SCAN_HOSTS`
pub fn max_scan_hosts() -> usize {
    env_parse_usize("NEXUS_MAX_SCAN_HOSTS", MAX_SCAN_HOSTS, 1, 1022)
}

/// Runtime-tunable MNDP listen port.
/// Env: `NEXUS_MNDP_PORT`
pub fn mndp_port() -> u16 {
    env_parse_u16("NEXUS_MNDP_PORT", MNDP_PORT, 1, u16::MAX)
}

/// Runtime-tunable MNDP capture window.
/// Env: `NEXUS_MNDP_WINDOW_MS`
pub fn mndp_capture_window() -> Duration {
    Duration::from_millis(env_parse_u64(
        "NEXUS_MNDP_WINDOW_MS",
        MNDP_CAPTURE_WINDOW.as_millis() as u64,
        100,
        10_000,
    ))
}

/// Runtime-tunable timeout for LLDP/CDP tooling.
/// Env: `NEXUS_TOOL_TIMEOUT_MS`
pub fn tool_timeout() -> Duration {
    Duration::from_millis(env_parse_u64(
        "NEXUS_TOOL_TIMEOUT_MS",
        TOOL_TIMEOUT.as_millis() as u64,
        100,
        30_000,
    ))
}

/// Runtime-tunable CDP listen window.
/// Env: `NEXUS_CDP_WINDOW_MS`
pub fn cdp_capture_window() -> Duration {
    Duration::from_millis(env_parse_u64(
        "NEXUS_CDP_WINDOW_MS",
        CDP_CAPTURE_WINDOW.as_millis() as u64,
        100,
        65_000,
    ))
}

/// Runtime-tunable stale threshold in minutes.
/// Env: `NEXUS_DEVICE_STALE_MINUTES`
pub fn device_stale_minutes() -> i64 {
    env_parse_i64(
        "NEXUS_DEVICE_STALE_MINUTES",
        DEVICE_STALE_MINUTES,
        1,
        10_080,
    )
}

/// Runtime-tunable consecutive-failure threshold for a critical halt.
/// Env: `NEXUS_CRITICAL_FAILURE_STREAK`
pub fn critical_failure_streak() -> u32 {
    env_parse_u32(
        "NEXUS_CRITICAL_FAILURE_STREAK",
        CRITICAL_FAILURE_STREAK,
        1,
        1_000,
    )
}

/// Optional safety stop file; its existence trips a critical halt.
/// Env: `NEXUS_SAFETY_STOP_FILE`
pub fn safety_stop_file() -> Option<std::path::PathBuf> {
    env_var("NEXUS_SAFETY_STOP_FILE").map(std::path::PathBuf::from)
}

/// Loop-level settings resolved once per run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSettings {
    pub max_cycles: u32,
    pub cycle_delay: Duration,
    pub empty_cycle_delay: Duration,
}

impl LoopSettings {
    /// Snapshot loop settings from the environment
    pub fn from_env() -> Self {
        Self::with_delays(max_cycles(), cycle_delay(), empty_cycle_delay_override())
    }

    /// Settings for the given delays
    ///
    /// The empty-cycle delay defaults to half the cycle delay. An explicit one
    /// that is not shorter than the cycle delay falls back to that half.
    pub fn with_delays(max_cycles: u32, cycle_delay: Duration, empty_cycle_delay: Option<Duration>) -> Self {
        let derived = cycle_delay / EMPTY_CYCLE_DELAY_DIVISOR as u32;
        let empty_cycle_delay = match empty_cycle_delay {
            Some(empty) if empty < cycle_delay || empty.is_zero() => empty,
            Some(empty) => {
                crate::log_warn!(
                    "Empty-cycle delay {:?} is not shorter than cycle delay {:?}, using {:?}",
                    empty,
                    cycle_delay,
                    derived
                );
                derived
            }
            None => derived,
        };
        Self {
            max_cycles,
            cycle_delay,
            empty_cycle_delay,
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_cycles: MAX_CYCLES,
            cycle_delay: Duration::from_secs(CYCLE_DELAY_SECS),
            empty_cycle_delay: Duration::from_secs(CYCLE_DELAY_SECS / EMPTY_CYCLE_DELAY_DIVISOR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_keep_two_to_one_ratio() {
        let settings = LoopSettings::default();
        assert_eq!(settings.max_cycles, 10);
        assert_eq!(settings.cycle_delay, Duration::from_secs(60));
        assert_eq!(settings.empty_cycle_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_cycle_delay_alone_derives_empty_delay() {
        let settings = LoopSettings::with_delays(3, Duration::from_secs(10), None);
        assert_eq!(settings.empty_cycle_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_explicit_empty_delay_survives_cycle_override() {
        let settings =
            LoopSettings::with_delays(3, Duration::from_secs(120), Some(Duration::from_secs(20)));
        assert_eq!(settings.cycle_delay, Duration::from_secs(120));
        assert_eq!(settings.empty_cycle_delay, Duration::from_secs(20));
    }

    #[test]
    fn test_empty_delay_not_shorter_is_clamped() {
        let settings =
            LoopSettings::with_delays(3, Duration::from_secs(30), Some(Duration::from_secs(90)));
        assert_eq!(settings.empty_cycle_delay, Duration::from_secs(15));

        let equal = LoopSettings::with_delays(3, Duration::from_secs(30), Some(Duration::from_secs(30)));
        assert_eq!(equal.empty_cycle_delay, Duration::from_secs(15));
    }

    #[test]
    fn test_default_communities_match_sweep_order() {
        assert_eq!(SNMP_COMMUNITIES[0], "public");
        assert_eq!(SNMP_COMMUNITIES.len(), 4);
    }
}
