//! Run orchestrator.
//!
//! Drives one run from configuration to a registered layout.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Orchestrator                            │
//! │                                                                  │
//! │  Planning ──► for each level, finest first:                      │
//! │                 RenderingLevel(z)   resize + pad + slice         │
//! │                 UploadingLevel(z)   ┌────────┐                   │
//! │                                     │ queue  │──► worker x4      │
//! │                                     └────────┘    encode+upload  │
//! │           ──► Finalizing ──► Completed | Error | Cancelled       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Levels are strictly sequential: every worker of level n has resolved
//! before level n+1 is rendered. Rendering and encoding run on the blocking
//! thread pool.
//!
//! Two tokens govern the upload fan-out. The run token belongs to the caller
//! and marks a user cancellation. Each level derives a child abort token that
//! a worker trips on its first fatal error, stopping its siblings without the
//! run being reported as cancelled.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use image::RgbaImage;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ProcessConfig;
use crate::error::{RenderError, RunError, UploadError};
use crate::progress::{ProgressState, RunStatus};
use crate::pyramid::{plan_pyramid, PyramidPlan, ZoomLevel};
use crate::tile::{decode_source, JpegTileEncoder, Tile, TileRenderer};
use crate::upload::{LayoutMetadata, LayoutServer, LayoutTarget, UploadClient};

/// Number of concurrent upload workers per level.
pub const UPLOAD_CONCURRENCY: usize = 4;

// =============================================================================
// Run State
// =============================================================================

/// Orchestrator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Planning,
    RenderingLevel(u32),
    UploadingLevel(u32),
    Finalizing,
    Completed,
    Error,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Error | RunState::Cancelled
        )
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub layout_path: String,
    pub max_zoom: u32,
    pub level_count: u32,
    pub tiles_uploaded: u32,
}

impl RunSummary {
    /// Message reported to the caller on success.
    pub fn message(&self) -> String {
        format!(
            "Processing completed successfully! Max zoom level: {}",
            self.max_zoom
        )
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Runs the pipeline once.
pub struct Orchestrator<S> {
    config: ProcessConfig,
    client: Arc<UploadClient<S>>,
    progress: ProgressState,
    cancel: CancellationToken,
    layout_path: Option<String>,
    state: RunState,
}

impl<S: LayoutServer> Orchestrator<S> {
    pub fn new(
        config: ProcessConfig,
        client: Arc<UploadClient<S>>,
        progress: ProgressState,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            client,
            progress,
            cancel,
            layout_path: None,
            state: RunState::Idle,
        }
    }

    /// Store tiles under a fixed layout path instead of a random one.
    pub fn with_layout_path(mut self, layout_path: impl Into<String>) -> Self {
        self.layout_path = Some(layout_path.into());
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run to a terminal state.
    ///
    /// Publishes exactly one terminal status and message to the progress
    /// state. A cancelled run returns [`RunError::Cancelled`] even when a
    /// worker failed while the cancellation was being observed.
    pub async fn run(&mut self) -> Result<RunSummary, RunError> {
        if self.state != RunState::Idle {
            return Err(RunError::AlreadyStarted);
        }
        self.progress.begin_run();

        let outcome = self.execute().await;

        match outcome {
            Ok(summary) => {
                self.state = RunState::Completed;
                info!(
                    layout_path = %summary.layout_path,
                    tiles = summary.tiles_uploaded,
                    max_zoom = summary.max_zoom,
                    "Layout upload completed"
                );
                self.progress
                    .finish(RunStatus::Completed, summary.message());
                Ok(summary)
            }
            Err(err) if err.is_cancelled() || self.cancel.is_cancelled() => {
                self.state = RunState::Cancelled;
                info!("Layout upload cancelled");
                self.progress
                    .finish(RunStatus::Cancelled, RunError::Cancelled.to_string());
                Err(RunError::Cancelled)
            }
            Err(err) => {
                self.state = RunState::Error;
                error!(error = %err, "Layout upload failed");
                self.progress.finish(RunStatus::Error, err.to_string());
                Err(err)
            }
        }
    }

    async fn execute(&mut self) -> Result<RunSummary, RunError> {
        self.state = RunState::Planning;
        self.config.validate()?;

        let server = self.config.server_url()?;
        let mut target = LayoutTarget::new(server, &self.config.layout_key, &self.config.secret);
        if let Some(path) = &self.layout_path {
            target = target.with_layout_path(path.clone());
        }
        let target = Arc::new(target);

        let image = self.config.image.clone();
        let source = run_blocking(move || decode_source(&image)).await?;
        let source = Arc::new(source);
        self.check_cancelled()?;

        let plan = plan_pyramid(source.width(), source.height(), self.config.tile_size)?;
        info!(
            width = plan.source_width,
            height = plan.source_height,
            tile_size = plan.tile_size,
            levels = plan.level_count(),
            tiles = plan.total_tiles(),
            layout_path = %target.layout_path,
            "Planned tile pyramid"
        );
        self.progress.set_total(plan.total_tiles());

        let renderer = TileRenderer::new(self.config.background_color, self.config.tile_size);
        let encoder = JpegTileEncoder::new(self.config.jpeg_quality);
        let mut uploaded = 0u32;

        for level in plan.levels.iter().copied() {
            self.check_cancelled()?;
            let tiles = self.render_level(&source, renderer, level).await?;

            self.state = RunState::UploadingLevel(level.zoom);
            self.progress.set_status(RunStatus::Uploading);
            uploaded += self.upload_level(&target, tiles, encoder).await?;

            info!(
                zoom = level.zoom,
                columns = level.columns,
                rows = level.rows,
                "Level uploaded"
            );
        }

        drop(source);
        self.check_cancelled()?;
        self.finalize(&plan, &target).await?;

        Ok(RunSummary {
            layout_path: target.layout_path.clone(),
            max_zoom: plan.max_zoom(),
            level_count: plan.level_count() as u32,
            tiles_uploaded: uploaded,
        })
    }

    async fn render_level(
        &mut self,
        source: &Arc<RgbaImage>,
        renderer: TileRenderer,
        level: ZoomLevel,
    ) -> Result<Vec<Tile>, RunError> {
        self.state = RunState::RenderingLevel(level.zoom);
        self.progress
            .set_level(level.zoom, RunStatus::GeneratingThumbnails);
        debug!(
            zoom = level.zoom,
            width = level.scaled_width,
            height = level.scaled_height,
            "Rendering level"
        );

        let src = Arc::clone(source);
        let canvas = run_blocking(move || renderer.render_canvas(&src, &level)).await?;

        self.check_cancelled()?;
        self.progress.set_status(RunStatus::ProcessingTiles);
        let tiles = run_blocking(move || renderer.slice(canvas, &level)).await?;

        Ok(tiles)
    }

    /// Encode and upload one level's tiles with a bounded worker pool.
    async fn upload_level(
        &self,
        target: &Arc<LayoutTarget>,
        tiles: Vec<Tile>,
        encoder: JpegTileEncoder,
    ) -> Result<u32, RunError> {
        let count = tiles.len();
        let queue = Arc::new(Mutex::new(VecDeque::from(tiles)));
        let abort = self.cancel.child_token();
        let mut workers = JoinSet::new();

        for _ in 0..UPLOAD_CONCURRENCY.min(count) {
            let worker = UploadWorker {
                queue: Arc::clone(&queue),
                client: Arc::clone(&self.client),
                target: Arc::clone(target),
                progress: self.progress.clone(),
                run: self.cancel.clone(),
                abort: abort.clone(),
                encoder,
            };
            workers.spawn(worker.run());
        }

        let mut uploaded = 0u32;
        let mut failure: Option<RunError> = None;

        while let Some(joined) = workers.join_next().await {
            let result = joined
                .unwrap_or_else(|e| Err(RunError::Render(RenderError::Task(e.to_string()))));

            match result {
                Ok(n) => uploaded += n,
                Err(err) => {
                    abort.cancel();
                    // A sibling stopped by the abort token reports Cancelled;
                    // keep the error that caused the abort.
                    let replace = match &failure {
                        None => true,
                        Some(existing) => existing.is_cancelled() && !err.is_cancelled(),
                    };
                    if replace {
                        failure = Some(err);
                    }
                }
            }
        }

        self.check_cancelled()?;
        match failure {
            Some(err) => Err(err),
            None => Ok(uploaded),
        }
    }

    async fn finalize(
        &mut self,
        plan: &PyramidPlan,
        target: &LayoutTarget,
    ) -> Result<(), RunError> {
        self.state = RunState::Finalizing;
        self.progress.set_status(RunStatus::Finalizing);

        let metadata = LayoutMetadata::from_plan(plan, target, self.config.background_color);
        debug!(max_zoom = metadata.max_zoom, "Finalizing layout");

        self.client
            .finalize(target, &metadata, &self.cancel)
            .await
            .map_err(|e| match e {
                UploadError::Cancelled => RunError::Cancelled,
                other => RunError::Finalize(other),
            })
    }

    fn check_cancelled(&self) -> Result<(), RunError> {
        if self.cancel.is_cancelled() {
            Err(RunError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl<S> fmt::Debug for Orchestrator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish()
    }
}

// =============================================================================
// Upload Worker
// =============================================================================

struct UploadWorker<S> {
    queue: Arc<Mutex<VecDeque<Tile>>>,
    client: Arc<UploadClient<S>>,
    target: Arc<LayoutTarget>,
    progress: ProgressState,
    run: CancellationToken,
    abort: CancellationToken,
    encoder: JpegTileEncoder,
}

impl<S: LayoutServer> UploadWorker<S> {
    /// Pull tiles until the queue drains or a token fires.
    async fn run(self) -> Result<u32, RunError> {
        let mut uploaded = 0u32;

        loop {
            if self.run.is_cancelled() || self.abort.is_cancelled() {
                break;
            }
            let Some(tile) = self.queue.lock().await.pop_front() else {
                break;
            };

            let key = tile.key;
            let encoder = self.encoder;
            let payload = run_blocking(move || encoder.encode(&tile.pixels)).await?;

            match self
                .client
                .upload_tile(&self.target, &key, payload, &self.abort)
                .await
            {
                Ok(()) => {
                    uploaded += 1;
                    self.progress.tile_completed();
                    debug!(tile = %key, "Tile uploaded");
                }
                Err(UploadError::Cancelled) => return Err(RunError::Cancelled),
                Err(source) => {
                    self.abort.cancel();
                    return Err(RunError::Upload {
                        tile: key.path(),
                        source,
                    });
                }
            }
        }

        Ok(uploaded)
    }
}

/// Run CPU-bound work on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T, RunError>
where
    F: FnOnce() -> Result<T, RenderError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RenderError::Task(e.to_string()))?
        .map_err(RunError::from)
}
