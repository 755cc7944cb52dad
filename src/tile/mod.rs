//! Tile rendering and encoding.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             Source image                │
//! └────────────────────┬────────────────────┘
//!                      │ per zoom level
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              TileRenderer               │
//! │   resize (Lanczos3) → pad → slice       │
//! └────────────────────┬────────────────────┘
//!                      │ Vec<Tile>
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            JpegTileEncoder              │
//! │   RGBA → RGB → JPEG (fixed quality)     │
//! └────────────────────┬────────────────────┘
//!                      │ Bytes
//!                      ▼
//!                upload client
//! ```
//!
//! # Components
//!
//! - [`TileRenderer`]: Produces the padded canvas for a level and slices it into tiles
//! - [`Tile`]: One tile's key and pixels
//! - [`JpegTileEncoder`]: Deterministic JPEG encoding of a tile
//! - [`decode_source`]: Loads the source image as RGBA

mod encoder;
mod renderer;

pub use encoder::{
    clamp_quality, is_valid_quality, JpegTileEncoder, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY, TILE_CONTENT_TYPE, TILE_FILE_NAME,
};
pub use renderer::{decode_source, Tile, TileRenderer, RESIZE_FILTER};
