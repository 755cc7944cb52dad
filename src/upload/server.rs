//! The layout server seam.
//!
//! [`LayoutServer`] is a single-attempt transport: one call, one request. Retry,
//! backoff and cancellation live one layer up in
//! [`UploadClient`](super::UploadClient).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use url::Url;
use uuid::Uuid;

use crate::config::BackgroundColor;
use crate::error::UploadError;
use crate::pyramid::{PyramidPlan, TileKey};

// =============================================================================
// Layout Target
// =============================================================================

/// Where a run's tiles go.
///
/// `layout_path` is a fresh random namespace per run, so tiles from an
/// abandoned run never mix with a later one.
#[derive(Clone)]
pub struct LayoutTarget {
    pub server: Url,
    pub layout_key: String,
    pub secret: String,
    pub layout_path: String,
}

impl LayoutTarget {
    /// Create a target with a new random layout path.
    pub fn new(server: Url, layout_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            server,
            layout_key: layout_key.into(),
            secret: secret.into(),
            layout_path: Uuid::new_v4().to_string(),
        }
    }

    /// Use a fixed layout path instead of the generated one.
    pub fn with_layout_path(mut self, layout_path: impl Into<String>) -> Self {
        self.layout_path = layout_path.into();
        self
    }
}

impl fmt::Debug for LayoutTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutTarget")
            .field("server", &self.server.as_str())
            .field("layout_key", &self.layout_key)
            .field("secret", &"<redacted>")
            .field("layout_path", &self.layout_path)
            .finish()
    }
}

// =============================================================================
// Layout Metadata
// =============================================================================

/// Canvas descriptor of one level, as registered with the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelMetadata {
    pub zoom: u32,
    pub width: u32,
    pub height: u32,
    pub columns: u32,
    pub rows: u32,
}

/// Body of the finalize call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutMetadata {
    pub layout_key: String,
    pub layout_path: String,
    pub source_width: u32,
    pub source_height: u32,
    pub tile_size: u32,
    pub background_color: BackgroundColor,
    pub max_zoom: u32,
    pub level_count: u32,
    pub levels: Vec<LevelMetadata>,
}

impl LayoutMetadata {
    pub fn from_plan(
        plan: &PyramidPlan,
        target: &LayoutTarget,
        background_color: BackgroundColor,
    ) -> Self {
        let levels = plan
            .levels
            .iter()
            .map(|level| LevelMetadata {
                zoom: level.zoom,
                width: level.canvas_width,
                height: level.canvas_height,
                columns: level.columns,
                rows: level.rows,
            })
            .collect::<Vec<_>>();

        Self {
            layout_key: target.layout_key.clone(),
            layout_path: target.layout_path.clone(),
            source_width: plan.source_width,
            source_height: plan.source_height,
            tile_size: plan.tile_size,
            background_color,
            max_zoom: plan.max_zoom(),
            level_count: levels.len() as u32,
            levels,
        }
    }
}

// =============================================================================
// LayoutServer Trait
// =============================================================================

/// Single-attempt transport to a layout-hosting server.
#[async_trait]
pub trait LayoutServer: Send + Sync + 'static {
    /// Upload one encoded tile.
    async fn send_tile(
        &self,
        target: &LayoutTarget,
        key: &TileKey,
        payload: Bytes,
    ) -> Result<(), UploadError>;

    /// Register the completed layout.
    async fn register_layout(
        &self,
        target: &LayoutTarget,
        metadata: &LayoutMetadata,
    ) -> Result<(), UploadError>;
}

#[async_trait]
impl<S: LayoutServer> LayoutServer for Arc<S> {
    async fn send_tile(
        &self,
        target: &LayoutTarget,
        key: &TileKey,
        payload: Bytes,
    ) -> Result<(), UploadError> {
        self.as_ref().send_tile(target, key, payload).await
    }

    async fn register_layout(
        &self,
        target: &LayoutTarget,
        metadata: &LayoutMetadata,
    ) -> Result<(), UploadError> {
        self.as_ref().register_layout(target, metadata).await
    }
}
