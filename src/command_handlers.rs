use anyhow::{Context, Result, anyhow};
use std::sync::Arc;
use std::time::Duration;

use nexus_research::adapt::{AdaptationEngine, SqliteDeviceManager};
use nexus_research::cache::{ResearchCache, SqliteCacheStore};
use nexus_research::controller::{CancelHandle, CycleController, smoke_test};
use nexus_research::database::{Database, DeviceFilter};
use nexus_research::exports::{export_device_inventory_json, reports_dir, write_run_report};
use nexus_research::network::ScanScope;
use nexus_research::registry::{DeviceRegistry, SqliteRegistry};
use nexus_research::research::ResearchEngine;
use nexus_research::scanner::default_probes;
use nexus_research::verify::SafetyVerifier;
use nexus_research::{DiscoveryProtocol, LoopSettings, config, log_error, log_stderr, log_warn};

/// Outcome a command hands back to `main`
pub(crate) type ExitCode = i32;

/// CLI values win; an explicit empty delay (CLI, then env) is kept over one
/// derived from an overridden cycle delay
fn loop_settings(
    max_cycles: Option<u32>,
    cycle_delay_secs: Option<u64>,
    empty_delay_secs: Option<u64>,
) -> LoopSettings {
    LoopSettings::with_delays(
        max_cycles.unwrap_or_else(config::max_cycles),
        cycle_delay_secs
            .map(Duration::from_secs)
            .unwrap_or_else(config::cycle_delay),
        empty_delay_secs
            .map(Duration::from_secs)
            .or_else(config::empty_cycle_delay_override),
    )
}

pub(crate) async fn handle_run(
    max_cycles: Option<u32>,
    cycle_delay_secs: Option<u64>,
    empty_delay_secs: Option<u64>,
    test_mode: bool,
    cancel: CancelHandle,
) -> Result<ExitCode> {
    if test_mode {
        return handle_smoke_test().await;
    }

    let settings = loop_settings(max_cycles, cycle_delay_secs, empty_delay_secs);

    log_stderr!(
        "NEXUS Research v{} ({} cycles)",
        env!("CARGO_PKG_VERSION"),
        settings.max_cycles
    );

    let db = Database::new(Database::default_path())
        .context("Failed to open research database")?;
    let registry: Arc<dyn DeviceRegistry> = Arc::new(SqliteRegistry::new(db.clone()));
    let cache = ResearchCache::new(Arc::new(SqliteCacheStore::new(db.clone())));
    let scope = ScanScope::detect().context("Failed to determine scan scope")?;

    let research = ResearchEngine::new(Arc::clone(&registry), cache.clone(), default_probes(), scope);
    let adaptation = AdaptationEngine::new(Arc::new(SqliteDeviceManager::new(db.clone())));
    let verifier = SafetyVerifier::new(Arc::clone(&registry), cache);

    let controller = CycleController::new(
        Arc::new(research),
        adaptation,
        Arc::new(verifier),
        registry,
    )
    .with_cancel_handle(cancel)
    .with_summary_sink(db);

    let report = controller.run(&settings).await;

    match write_run_report(&report, &reports_dir()) {
        Ok(path) => log_stderr!("Run report written to {}", path.display()),
        Err(e) => log_warn!("Run report not written: {:#}", e),
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize run report")?
    );
    Ok(report.exit_code())
}

pub(crate) async fn handle_smoke_test() -> Result<ExitCode> {
    log_stderr!("NEXUS Research self-check (offline)");

    let report = smoke_test().await;
    for check in report.checks.iter().filter(|c| !c.passed) {
        log_error!("Self-check {} failed: {}", check.subsystem, check.detail);
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize self-check report")?
    );
    Ok(report.exit_code())
}

pub(crate) async fn handle_devices(protocol: Option<String>, limit: usize) -> Result<ExitCode> {
    let mut filter = DeviceFilter::all();
    if let Some(raw) = protocol {
        let protocol: DiscoveryProtocol = raw
            .to_ascii_uppercase()
            .parse()
            .map_err(|e: String| anyhow!(e))?;
        filter = filter.protocol(protocol);
    }

    let db = Database::new(Database::default_path())
        .context("Failed to open database. Run the research loop first to discover devices")?;
    let mut devices = SqliteRegistry::new(db).list(&filter)?;
    devices.truncate(limit);

    let json = export_device_inventory_json(&devices).context("Failed to serialize devices")?;
    println!("{}", json);
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_empty_delay_kept_with_cycle_delay_override() {
        let settings = loop_settings(Some(2), Some(120), Some(20));
        assert_eq!(settings.max_cycles, 2);
        assert_eq!(settings.cycle_delay, Duration::from_secs(120));
        assert_eq!(settings.empty_cycle_delay, Duration::from_secs(20));
    }

    #[test]
    fn test_cli_empty_delay_above_cycle_delay_is_clamped() {
        let settings = loop_settings(Some(1), Some(10), Some(60));
        assert_eq!(settings.empty_cycle_delay, Duration::from_secs(5));
    }
}
