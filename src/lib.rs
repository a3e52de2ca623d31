//! NEXUS Research - bounded network discovery and adaptive research loop
//!
//! Each cycle researches the network (SNMP sweeps, MNDP capture, LLDP and CDP
//! neighbor tables) plus a static topic catalog, adapts high-priority
//! findings, verifies system health and logs a cycle summary:
//! - Cycle controller with pacing, cancellation and safety halts
//! - Protocol probes behind one async trait
//! - Time-windowed research cache
//! - SQLite device registry, upserted by address

pub mod adapt;
pub mod cache;
pub mod config;
pub mod controller;
pub mod database;
pub mod exports;
pub mod logging;
pub mod models;
pub mod network;
pub mod registry;
pub mod report;
pub mod research;
pub mod scanner;
pub mod verify;

pub use config::*;
pub use controller::{CancelHandle, CycleController};
pub use database::Database;
pub use models::*;
pub use report::RunReport;

// Re-export logging macros for use across crate
pub use crate::logging::macros;
