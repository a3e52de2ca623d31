//! External tool lookup and bounded invocation

use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{Instant, timeout, timeout_at};

use crate::log_debug;

/// Locate an executable on `PATH`
pub fn find_tool(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

fn spawn_piped(program: &Path, args: &[&str]) -> Result<tokio::process::Child> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn {}", program.display()))
}

/// Run a tool and capture stdout; the child is killed when `limit` elapses
pub async fn run_tool(program: &Path, args: &[&str], limit: Duration) -> Result<String> {
    let child = spawn_piped(program, args)?;

    let output = timeout(limit, child.wait_with_output())
        .await
        .map_err(|_| anyhow!("{} timed out after {:?}", program.display(), limit))?
        .with_context(|| format!("Failed to wait for {}", program.display()))?;

    if !output.status.success() {
        return Err(anyhow!("{} exited with {}", program.display(), output.status));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Read a capture tool's stdout until it exits or `window` closes
///
/// Output seen before the window closes is returned; the child is killed
/// afterwards. An empty string means nothing arrived in the window.
pub async fn capture_tool(program: &Path, args: &[&str], window: Duration) -> Result<String> {
    let mut child = spawn_piped(program, args)?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("{} stdout not captured", program.display()))?;

    let deadline = Instant::now() + window;
    let mut captured = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match timeout_at(deadline, stdout.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => captured.extend_from_slice(&chunk[..n]),
            Ok(Err(e)) => {
                return Err(e).with_context(|| format!("Failed to read {}", program.display()));
            }
            Err(_) => {
                log_debug!("{} capture window of {:?} closed", program.display(), window);
                break;
            }
        }
    }

    if let Err(e) = child.start_kill() {
        log_debug!("{} already exited: {}", program.display(), e);
    }
    if let Err(e) = child.wait().await {
        log_debug!("Failed to reap {}: {}", program.display(), e);
    }

    Ok(String::from_utf8_lossy(&captured).into_owned())
}
