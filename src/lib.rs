//! # Layout Uploader
//!
//! Turns a single raster image into a deep zoom tile pyramid and publishes it
//! to a layout-hosting server.
//!
//! For every zoom level the image is resized from the full-resolution source,
//! padded to a whole number of tiles with a background color, sliced into
//! square JPEG tiles, and uploaded concurrently with bounded retries. Once all
//! levels are up, the layout is registered with a single finalize call.
//!
//! ## Architecture
//!
//! - [`pyramid`] - Pure planning of zoom levels, canvases and tile grids
//! - [`tile`] - Rendering (resize, pad, slice) and JPEG encoding
//! - [`upload`] - HTTP transport and the retrying upload client
//! - [`progress`] - Shared progress snapshot
//! - [`pipeline`] - The run state machine and the start/cancel/progress session
//! - [`config`] - Run configuration and CLI
//!
//! ## Example
//!
//! ```rust,no_run
//! use layout_uploader::{
//!     HttpLayoutServer, ImageSource, ProcessConfig, ServerTarget, UploadClient, UploadSession,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let target: ServerTarget = "https://layouts.example.com|lobby|s3cret".parse()?;
//!     let config = ProcessConfig::new(ImageSource::from_path("floor.png"), target);
//!
//!     let session = UploadSession::new(UploadClient::new(HttpLayoutServer::new()?));
//!     let message = session.start(config).await?;
//!     println!("{}", message);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod pyramid;
pub mod tile;
pub mod upload;

// Re-export commonly used types
pub use config::{
    BackgroundColor, Cli, Command, ImageSource, PlanConfig, ProcessConfig, ServerTarget,
    UploadConfig, DEFAULT_TILE_SIZE, MAX_TILE_SIZE, MIN_TILE_SIZE,
};
pub use error::{ConfigError, PlanningError, RenderError, RunError, UploadError};
pub use pipeline::{Orchestrator, RunState, RunSummary, UploadSession, UPLOAD_CONCURRENCY};
pub use progress::{ProgressState, ProgressUpdate, RunStatus};
pub use pyramid::{
    plan_pyramid, plan_pyramid_with_bounds, PyramidPlan, TileKey, ZoomBounds, ZoomLevel,
};
pub use tile::{JpegTileEncoder, Tile, TileRenderer, DEFAULT_JPEG_QUALITY};
pub use upload::{
    HttpLayoutServer, LayoutMetadata, LayoutServer, LayoutTarget, RetryPolicy, UploadClient,
};
