//! Level rendering: resize, pad and slice.
//!
//! For each zoom level the renderer resizes the source image straight to the
//! level's scaled size (always from the full-resolution source, never from a
//! previous level), composites it over a canvas filled with the background
//! color, and cuts the canvas into square tiles.
//!
//! ```text
//!  source ──Lanczos3──► scaled ──overlay──► canvas ──slice──► tiles (row-major)
//!                                  ▲
//!                    background fill (opaque)
//! ```
//!
//! The canvas is consumed by slicing, so only one level's pixels are alive at
//! a time.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, RgbaImage};

use crate::config::{BackgroundColor, ImageSource};
use crate::error::RenderError;
use crate::pyramid::{TileKey, ZoomLevel};

/// Resampling filter used for every level.
pub const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

// =============================================================================
// Tile
// =============================================================================

/// One rendered tile, exactly `tile_size` x `tile_size` pixels.
#[derive(Debug, Clone)]
pub struct Tile {
    pub key: TileKey,
    pub pixels: RgbaImage,
}

// =============================================================================
// Source Decoding
// =============================================================================

/// Decode the source image into RGBA pixels.
///
/// This is blocking (file I/O and decode); callers on an async runtime should
/// run it under `spawn_blocking`.
pub fn decode_source(source: &ImageSource) -> Result<RgbaImage, RenderError> {
    let rgba = match source {
        ImageSource::Path(path) => image::open(path)
            .map_err(|e| RenderError::Decode {
                message: format!("{}: {}", path.display(), e),
            })?
            .into_rgba8(),
        ImageSource::Memory(image) => image.to_rgba8(),
    };

    if rgba.width() == 0 || rgba.height() == 0 {
        return Err(RenderError::Decode {
            message: format!("image has no pixels ({}x{})", rgba.width(), rgba.height()),
        });
    }
    Ok(rgba)
}

// =============================================================================
// Tile Renderer
// =============================================================================

/// Produces padded level canvases and slices them into tiles.
#[derive(Debug, Clone, Copy)]
pub struct TileRenderer {
    background: BackgroundColor,
    tile_size: u32,
}

impl TileRenderer {
    pub fn new(background: BackgroundColor, tile_size: u32) -> Self {
        Self {
            background,
            tile_size,
        }
    }

    /// Resize the source to the level's scaled size.
    pub fn resize(&self, source: &RgbaImage, level: &ZoomLevel) -> Result<RgbaImage, RenderError> {
        if source.width() == 0 || source.height() == 0 {
            return Err(RenderError::Canvas {
                zoom: level.zoom,
                message: "source image is empty".to_string(),
            });
        }
        if level.scaled_width == 0 || level.scaled_height == 0 {
            return Err(RenderError::Canvas {
                zoom: level.zoom,
                message: format!(
                    "scaled size {}x{} is empty",
                    level.scaled_width, level.scaled_height
                ),
            });
        }

        Ok(imageops::resize(
            source,
            level.scaled_width,
            level.scaled_height,
            RESIZE_FILTER,
        ))
    }

    /// Place a resized image on a background-filled canvas of the level's size.
    pub fn pad(&self, scaled: &RgbaImage, level: &ZoomLevel) -> Result<RgbaImage, RenderError> {
        if scaled.width() + level.offset_x > level.canvas_width
            || scaled.height() + level.offset_y > level.canvas_height
        {
            return Err(RenderError::Canvas {
                zoom: level.zoom,
                message: format!(
                    "scaled image {}x{} at ({}, {}) does not fit canvas {}x{}",
                    scaled.width(),
                    scaled.height(),
                    level.offset_x,
                    level.offset_y,
                    level.canvas_width,
                    level.canvas_height
                ),
            });
        }

        let mut canvas: RgbaImage = ImageBuffer::from_pixel(
            level.canvas_width,
            level.canvas_height,
            self.background.to_rgba(),
        );
        imageops::overlay(
            &mut canvas,
            scaled,
            i64::from(level.offset_x),
            i64::from(level.offset_y),
        );
        Ok(canvas)
    }

    /// Resize and pad in one step.
    pub fn render_canvas(
        &self,
        source: &RgbaImage,
        level: &ZoomLevel,
    ) -> Result<RgbaImage, RenderError> {
        let scaled = self.resize(source, level)?;
        self.pad(&scaled, level)
    }

    /// Cut a level canvas into row-major tiles, consuming the canvas.
    pub fn slice(&self, canvas: RgbaImage, level: &ZoomLevel) -> Result<Vec<Tile>, RenderError> {
        let ts = self.tile_size;
        if ts == 0
            || canvas.width() != level.canvas_width
            || canvas.height() != level.canvas_height
            || canvas.width() % ts != 0
            || canvas.height() % ts != 0
        {
            return Err(RenderError::Canvas {
                zoom: level.zoom,
                message: format!(
                    "canvas {}x{} cannot be sliced into {}px tiles for a {}x{} grid",
                    canvas.width(),
                    canvas.height(),
                    ts,
                    level.columns,
                    level.rows
                ),
            });
        }

        let tiles = level
            .tile_keys(ts)
            .map(|key| Tile {
                key,
                pixels: imageops::crop_imm(&canvas, key.x(), key.y(), ts, ts).to_image(),
            })
            .collect();

        Ok(tiles)
    }

    /// Render the level and slice it into tiles.
    pub fn render_level(
        &self,
        source: &RgbaImage,
        level: &ZoomLevel,
    ) -> Result<Vec<Tile>, RenderError> {
        let canvas = self.render_canvas(source, level)?;
        self.slice(canvas, level)
    }
}
