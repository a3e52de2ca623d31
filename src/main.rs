//! NEXUS Research - adaptive network discovery loop
//!
//! Runs bounded Research -> Adapt -> Verify -> Log cycles over SNMP, MNDP,
//! LLDP and CDP, keeps the device registry current and writes a run report.
//! Ctrl-C stops the loop at the next stage boundary.

mod app;
mod cli;
mod command_handlers;

use nexus_research::controller::CancelHandle;
use nexus_research::{log_error, log_warn};

#[tokio::main]
async fn main() {
    if let Err(e) = nexus_research::logging::init_logging() {
        eprintln!("[WARN] Failed to initialize structured logging: {}", e);
    }

    let cancel = CancelHandle::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log_warn!("Interrupt received; stopping after the current stage");
            on_signal.cancel();
        }
    });

    match app::run(std::env::args(), cancel).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            log_error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
