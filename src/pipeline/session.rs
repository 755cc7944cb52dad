//! Caller-facing command surface: start, cancel, progress.
//!
//! An [`UploadSession`] allows one run at a time. It is cheap to clone; all
//! clones share the same progress state and active-run slot, so one task can
//! drive `start` while another polls `progress` or calls `cancel`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::orchestrator::Orchestrator;
use crate::config::ProcessConfig;
use crate::error::RunError;
use crate::progress::{ProgressState, ProgressUpdate};
use crate::upload::{LayoutServer, UploadClient};

type RunSlot = Arc<Mutex<Option<CancellationToken>>>;

/// One-run-at-a-time upload session.
pub struct UploadSession<S> {
    client: Arc<UploadClient<S>>,
    progress: ProgressState,
    active: RunSlot,
}

impl<S> Clone for UploadSession<S> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            progress: self.progress.clone(),
            active: Arc::clone(&self.active),
        }
    }
}

impl<S: LayoutServer> UploadSession<S> {
    pub fn new(client: UploadClient<S>) -> Self {
        Self {
            client: Arc::new(client),
            progress: ProgressState::new(),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Run the pipeline to completion.
    ///
    /// Returns the success message, or the terminal error. Rejected with
    /// [`RunError::AlreadyRunning`] while another run is active; the active
    /// run is not affected.
    pub async fn start(&self, config: ProcessConfig) -> Result<String, RunError> {
        let token = CancellationToken::new();
        let _active = ActiveRun::claim(&self.active, token.clone())?;

        let mut orchestrator =
            Orchestrator::new(config, Arc::clone(&self.client), self.progress.clone(), token);
        let summary = orchestrator.run().await?;
        Ok(summary.message())
    }

    /// Cancel the active run. No-op when idle; safe to repeat.
    pub fn cancel(&self) {
        if let Some(token) = lock(&self.active).as_ref() {
            if !token.is_cancelled() {
                info!("Cancellation requested");
            }
            token.cancel();
        }
    }

    /// Latest progress, or `None` if no run has started yet.
    pub fn progress(&self) -> Option<ProgressUpdate> {
        self.progress.snapshot()
    }

    /// Push variant of [`progress`](Self::progress).
    pub fn subscribe(&self) -> watch::Receiver<Option<ProgressUpdate>> {
        self.progress.subscribe()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.active).is_some()
    }
}

/// Occupies the active-run slot until dropped.
struct ActiveRun {
    slot: RunSlot,
}

impl ActiveRun {
    fn claim(slot: &RunSlot, token: CancellationToken) -> Result<Self, RunError> {
        let mut guard = lock(slot);
        if guard.is_some() {
            return Err(RunError::AlreadyRunning);
        }
        *guard = Some(token);
        Ok(Self {
            slot: Arc::clone(slot),
        })
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        *lock(&self.slot) = None;
    }
}

fn lock(slot: &RunSlot) -> MutexGuard<'_, Option<CancellationToken>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
