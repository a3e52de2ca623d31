//! Inter-cycle pacing and cancellation

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// External stop request, observed at stage boundaries and during sleeps
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Pacer: Send + Sync {
    /// Wait `delay`; false when cancelled before it elapsed
    fn pause<'a>(
        &'a self,
        delay: Duration,
        cancel: &'a CancelHandle,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

/// Real sleeps, interrupted by cancellation
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPacer;

impl Pacer for TokioPacer {
    fn pause<'a>(
        &'a self,
        delay: Duration,
        cancel: &'a CancelHandle,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => true,
                _ = cancel.cancelled() => false,
            }
        })
    }
}

/// Records requested delays without sleeping
#[derive(Debug, Default)]
pub struct RecordingPacer {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingPacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

impl Pacer for RecordingPacer {
    fn pause<'a>(
        &'a self,
        delay: Duration,
        cancel: &'a CancelHandle,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(delay);
        }
        let proceed = !cancel.is_cancelled();
        Box::pin(async move { proceed })
    }
}
