//! Export functionality for reports
//!
//! Provides JSON export of run reports and the device inventory

pub mod json;

pub use json::*;
