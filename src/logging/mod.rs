//! Structured logging for the research loop
//!
//! Console output goes to stderr; a JSON copy is written to a daily rotating
//! file under the platform config directory.

pub mod macros;

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const APP_DIR: &str = "nexus-research";
const LOG_FILE_PREFIX: &str = "nexus-research.log";

/// Initialize the logging system
///
/// Logs are written to `<config dir>/nexus-research/logs/nexus-research.log.YYYY-MM-DD`.
/// `RUST_LOG` controls the level (default `info`).
pub fn init_logging() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let log_dir = get_log_directory()?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_line_number(true)
        .compact();

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .json();

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let init_result = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    if let Err(e) = init_result {
        // Tests and embedding hosts may have installed a subscriber already.
        if e.to_string().contains("already been set") {
            return Ok(log_dir);
        }
        return Err(Box::new(e));
    }

    tracing::info!("Logging initialized. Log directory: {}", log_dir.display());

    Ok(log_dir)
}

/// Get log directory path
///
/// Returns: `%LOCALAPPDATA%/nexus-research/logs` on Windows,
///          `~/.config/nexus-research/logs` elsewhere
fn get_log_directory() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let base_dir = if cfg!(target_os = "windows") {
        dirs::data_local_dir().ok_or("Could not find APPDATA directory")?
    } else {
        dirs::config_dir().ok_or("Could not find config directory")?
    };

    Ok(base_dir.join(APP_DIR).join("logs"))
}

/// Get today's log file path
pub fn get_current_log_file() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let log_dir = get_log_directory()?;
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    Ok(log_dir.join(format!("{LOG_FILE_PREFIX}.{today}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directory_is_namespaced() {
        let log_dir = get_log_directory().expect("Should get log directory");
        assert!(log_dir.to_string_lossy().contains(APP_DIR));
        assert!(log_dir.ends_with("logs"));
    }

    #[test]
    fn test_current_log_file_carries_date_suffix() {
        let file = get_current_log_file().expect("Should build log file path");
        let name = file.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(LOG_FILE_PREFIX));
    }
}
