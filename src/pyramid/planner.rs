//! Zoom-level planning for the tile pyramid.
//!
//! # Level Numbering
//!
//! Zoom 0 is the coarsest level: its scaled image spans exactly one tile on its
//! longest edge. Each finer level doubles that edge, so zoom `z` targets
//! `tile_size * 2^z` pixels. The finest level is the first one whose target
//! covers the source's longest edge:
//!
//! ```text
//! levels   = ceil(log2(ceil(max_edge / tile_size))) + 1
//! target_z = tile_size << z
//! ```
//!
//! # Padding
//!
//! Each scaled dimension is rounded up to the next multiple of the tile size.
//! The scaled image is centered in the padded canvas; when the padding is odd,
//! the extra pixel goes to the right/bottom edge.
//!
//! ```text
//! 1000x700 @ 256:
//!   zoom 2  scaled 1024x716  canvas 1024x768  grid 4x3  offset (0, 26)
//!   zoom 1  scaled  512x358  canvas  512x512  grid 2x2  offset (0, 77)
//!   zoom 0  scaled  256x179  canvas  256x256  grid 1x1  offset (0, 38)
//! ```

use std::fmt;

use serde::Serialize;

use crate::error::PlanningError;

// =============================================================================
// Zoom Bounds
// =============================================================================

/// Restricts which zoom indices a plan emits.
///
/// Zoom indices are never renumbered: a plan bounded to `min_zoom = 2` still
/// labels its coarsest level as zoom 2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZoomBounds {
    /// Coarsest zoom to emit
    pub min_zoom: u32,

    /// Finest zoom to emit (None = full source detail)
    pub max_zoom: Option<u32>,
}

impl ZoomBounds {
    /// Bounds that emit every level.
    pub fn all() -> Self {
        Self::default()
    }

    /// Bounds limited to `min_zoom..=max_zoom`.
    pub fn new(min_zoom: u32, max_zoom: u32) -> Self {
        Self {
            min_zoom,
            max_zoom: Some(max_zoom),
        }
    }
}

// =============================================================================
// Tile Key
// =============================================================================

/// Identifies one tile of the pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TileKey {
    /// Zoom level (0 = coarsest)
    pub zoom: u32,

    /// Tile column (0-indexed from left)
    pub column: u32,

    /// Tile row (0-indexed from top)
    pub row: u32,

    /// Tile edge length in pixels
    pub tile_size: u32,
}

impl TileKey {
    pub fn new(zoom: u32, column: u32, row: u32, tile_size: u32) -> Self {
        Self {
            zoom,
            column,
            row,
            tile_size,
        }
    }

    /// Pixel offset of the tile's left edge within the level canvas.
    pub fn x(&self) -> u32 {
        self.column * self.tile_size
    }

    /// Pixel offset of the tile's top edge within the level canvas.
    pub fn y(&self) -> u32 {
        self.row * self.tile_size
    }

    /// Server-relative path of this tile: `{zoom}/{x}/{y}`.
    pub fn path(&self) -> String {
        format!("{}/{}/{}", self.zoom, self.x(), self.y())
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.column, self.row)
    }
}

// =============================================================================
// Zoom Level
// =============================================================================

/// Geometry of one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ZoomLevel {
    /// Zoom index (0 = coarsest)
    pub zoom: u32,

    /// Width of the resized source before padding
    pub scaled_width: u32,

    /// Height of the resized source before padding
    pub scaled_height: u32,

    /// Padded canvas width (multiple of the tile size)
    pub canvas_width: u32,

    /// Padded canvas height (multiple of the tile size)
    pub canvas_height: u32,

    /// Left edge of the scaled image within the canvas
    pub offset_x: u32,

    /// Top edge of the scaled image within the canvas
    pub offset_y: u32,

    /// Tiles across
    pub columns: u32,

    /// Tiles down
    pub rows: u32,
}

impl ZoomLevel {
    /// Number of tiles at this level.
    pub fn tile_count(&self) -> u32 {
        self.columns.saturating_mul(self.rows)
    }

    /// Tile keys at this level in row-major order.
    pub fn tile_keys(&self, tile_size: u32) -> impl Iterator<Item = TileKey> + '_ {
        let zoom = self.zoom;
        let columns = self.columns;
        (0..self.rows).flat_map(move |row| {
            (0..columns).map(move |column| TileKey::new(zoom, column, row, tile_size))
        })
    }
}

// =============================================================================
// Pyramid Plan
// =============================================================================

/// The full set of levels for one source image, finest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PyramidPlan {
    pub source_width: u32,
    pub source_height: u32,
    pub tile_size: u32,
    pub levels: Vec<ZoomLevel>,
}

impl PyramidPlan {
    /// Total tiles across all levels.
    pub fn total_tiles(&self) -> u32 {
        self.levels
            .iter()
            .fold(0u32, |acc, level| acc.saturating_add(level.tile_count()))
    }

    /// Number of levels in the plan.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Zoom index of the most detailed level.
    pub fn max_zoom(&self) -> u32 {
        self.levels.first().map(|l| l.zoom).unwrap_or(0)
    }

    /// The most detailed level.
    pub fn finest(&self) -> Option<&ZoomLevel> {
        self.levels.first()
    }

    /// The least detailed level.
    pub fn coarsest(&self) -> Option<&ZoomLevel> {
        self.levels.last()
    }

    /// Look up a level by zoom index.
    pub fn level(&self, zoom: u32) -> Option<&ZoomLevel> {
        self.levels.iter().find(|l| l.zoom == zoom)
    }
}

// =============================================================================
// Planner
// =============================================================================

/// Plan every level of the pyramid for a `width` x `height` source.
pub fn plan_pyramid(width: u32, height: u32, tile_size: u32) -> Result<PyramidPlan, PlanningError> {
    plan_pyramid_with_bounds(width, height, tile_size, ZoomBounds::all())
}

/// Plan the pyramid, emitting only the zoom indices allowed by `bounds`.
///
/// # Errors
///
/// - [`PlanningError::InvalidDimensions`] if either dimension is zero or the
///   finest level would not fit in `u32`
/// - [`PlanningError::InvalidTileSize`] if `tile_size` is zero
/// - [`PlanningError::InvalidZoomBounds`] if `min_zoom > max_zoom`
pub fn plan_pyramid_with_bounds(
    width: u32,
    height: u32,
    tile_size: u32,
    bounds: ZoomBounds,
) -> Result<PyramidPlan, PlanningError> {
    if width == 0 || height == 0 {
        return Err(PlanningError::InvalidDimensions { width, height });
    }
    if tile_size == 0 {
        return Err(PlanningError::InvalidTileSize(tile_size));
    }
    if let Some(max_zoom) = bounds.max_zoom {
        if bounds.min_zoom > max_zoom {
            return Err(PlanningError::InvalidZoomBounds {
                min_zoom: bounds.min_zoom,
                max_zoom,
            });
        }
    }

    let natural_max = max_zoom_for(width, height, tile_size);
    let top = bounds.max_zoom.map_or(natural_max, |z| z.min(natural_max));
    let bottom = bounds.min_zoom.min(top);

    let levels = (bottom..=top)
        .rev()
        .map(|zoom| plan_level(width, height, tile_size, zoom))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PyramidPlan {
        source_width: width,
        source_height: height,
        tile_size,
        levels,
    })
}

/// Zoom index of the finest level for the given source.
///
/// Equals `ceil(log2(ceil(max_edge / tile_size)))`, so a source no larger
/// than one tile has a single level (zoom 0).
pub fn max_zoom_for(width: u32, height: u32, tile_size: u32) -> u32 {
    let tiles = width.max(height).div_ceil(tile_size.max(1));
    ceil_log2(tiles)
}

fn ceil_log2(n: u32) -> u32 {
    if n <= 1 {
        0
    } else {
        u32::BITS - (n - 1).leading_zeros()
    }
}

fn plan_level(width: u32, height: u32, tile_size: u32, zoom: u32) -> Result<ZoomLevel, PlanningError> {
    let overflow = PlanningError::InvalidDimensions { width, height };

    let max_edge = u128::from(width.max(height));
    let target = u128::from(tile_size) << zoom;
    let tile = u128::from(tile_size);

    let scale = |edge: u32| -> u128 { (u128::from(edge) * target / max_edge).max(1) };
    let scaled_w = scale(width);
    let scaled_h = scale(height);

    let canvas_w = scaled_w.div_ceil(tile) * tile;
    let canvas_h = scaled_h.div_ceil(tile) * tile;

    let narrow = |v: u128| u32::try_from(v).map_err(|_| overflow.clone());

    Ok(ZoomLevel {
        zoom,
        scaled_width: narrow(scaled_w)?,
        scaled_height: narrow(scaled_h)?,
        canvas_width: narrow(canvas_w)?,
        canvas_height: narrow(canvas_h)?,
        offset_x: narrow((canvas_w - scaled_w) / 2)?,
        offset_y: narrow((canvas_h - scaled_h) / 2)?,
        columns: narrow(canvas_w / tile)?,
        rows: narrow(canvas_h / tile)?,
    })
}
