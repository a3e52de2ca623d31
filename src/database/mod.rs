//! Database module for the research store
//!
//! Provides SQLite storage for:
//! - Discovered devices (the device registry)
//! - Research cache entries
//! - Adaptation intents
//! - Cycle summaries

pub mod connection;
pub mod models;
pub mod queries;
pub mod schema;

pub use connection::Database;
pub use models::*;
pub use queries::*;
