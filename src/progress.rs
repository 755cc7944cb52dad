//! Shared run progress.
//!
//! [`ProgressState`] is the one piece of state shared between the running
//! pipeline and its observers. It wraps a single `tokio::sync::watch` channel;
//! every mutation goes through `send_modify`, so readers always see a whole
//! snapshot and subscribers are woken on each change.
//!
//! Invariants within a run:
//! - `current` never decreases and never exceeds `total`
//! - `percentage` stays in [0, 100] and never decreases
//! - once a terminal status is published, the snapshot is frozen until the
//!   next [`ProgressState::begin_run`]

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use tokio::sync::watch;

// =============================================================================
// Run Status
// =============================================================================

/// Coarse status reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    Starting,
    ProcessingTiles,
    Uploading,
    GeneratingThumbnails,
    Finalizing,
    Cancelled,
    Completed,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Starting => "Starting",
            RunStatus::ProcessingTiles => "Processing tiles",
            RunStatus::Uploading => "Uploading",
            RunStatus::GeneratingThumbnails => "Generating thumbnails",
            RunStatus::Finalizing => "Finalizing",
            RunStatus::Cancelled => "Cancelled",
            RunStatus::Completed => "Completed",
            RunStatus::Error => "Error",
        }
    }

    /// Whether the run has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Cancelled | RunStatus::Completed | RunStatus::Error
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RunStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// =============================================================================
// Progress Update
// =============================================================================

/// Point-in-time view of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub current: u32,
    pub total: u32,
    pub zoom_level: u32,
    pub percentage: f64,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressUpdate {
    fn starting() -> Self {
        Self {
            current: 0,
            total: 0,
            zoom_level: 0,
            percentage: 0.0,
            status: RunStatus::Starting,
            message: None,
        }
    }

    fn recompute_percentage(&mut self) {
        let pct = if self.total == 0 {
            0.0
        } else {
            (self.current as f64 / self.total as f64) * 100.0
        };
        self.percentage = self.percentage.max(pct.clamp(0.0, 100.0));
    }
}

// =============================================================================
// Progress State
// =============================================================================

/// Cloneable handle to the shared progress snapshot.
#[derive(Clone)]
pub struct ProgressState {
    tx: Arc<watch::Sender<Option<ProgressUpdate>>>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressState {
    /// Create state with no run recorded.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Latest snapshot, or `None` if no run has ever started.
    pub fn snapshot(&self) -> Option<ProgressUpdate> {
        self.tx.borrow().clone()
    }

    /// Receiver woken on every change.
    pub fn subscribe(&self) -> watch::Receiver<Option<ProgressUpdate>> {
        self.tx.subscribe()
    }

    /// Reset to a fresh `Starting` snapshot.
    pub fn begin_run(&self) {
        self.tx.send_replace(Some(ProgressUpdate::starting()));
    }

    /// Publish the total number of tiles of the run.
    pub fn set_total(&self, total: u32) {
        self.update(|p| {
            p.total = total;
            p.current = p.current.min(total);
            p.recompute_percentage();
        });
    }

    /// Publish the level being worked on and the current status.
    pub fn set_level(&self, zoom_level: u32, status: RunStatus) {
        self.update(|p| {
            p.zoom_level = zoom_level;
            p.status = status;
        });
    }

    /// Publish a non-terminal status change.
    pub fn set_status(&self, status: RunStatus) {
        self.update(|p| p.status = status);
    }

    /// Count one uploaded tile.
    pub fn tile_completed(&self) {
        self.update(|p| {
            if p.current < p.total {
                p.current += 1;
            }
            p.recompute_percentage();
        });
    }

    /// Publish the terminal status and message. Later updates are ignored.
    pub fn finish(&self, status: RunStatus, message: impl Into<String>) {
        let message = message.into();
        self.tx.send_modify(|slot| {
            let p = slot.get_or_insert_with(ProgressUpdate::starting);
            if p.status.is_terminal() {
                return;
            }
            p.status = status;
            p.message = Some(message);
            if status == RunStatus::Completed {
                p.current = p.total;
                p.percentage = 100.0;
            }
        });
    }

    fn update(&self, f: impl FnOnce(&mut ProgressUpdate)) {
        self.tx.send_if_modified(|slot| match slot {
            Some(p) if !p.status.is_terminal() => {
                f(p);
                true
            }
            _ => false,
        });
    }
}

impl fmt::Debug for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProgressState")
            .field(&*self.tx.borrow())
            .finish()
    }
}
