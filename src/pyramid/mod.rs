//! Tile pyramid planning.
//!
//! Given the source dimensions and a tile size, the planner computes every
//! zoom level of the deep zoom pyramid: the resized image size, the padded
//! canvas (always a whole number of tiles), where the image sits inside the
//! canvas, and the tile grid.
//!
//! ```text
//!   zoom 2 (finest)          zoom 1             zoom 0 (coarsest)
//! ┌────┬────┬────┬────┐    ┌────┬────┐           ┌────┐
//! │    │    │    │    │    │    │    │           │    │
//! ├────┼────┼────┼────┤    ├────┼────┤           └────┘
//! │    │    │    │    │    │    │    │
//! ├────┼────┼────┼────┤    └────┴────┘
//! │    │    │    │    │
//! └────┴────┴────┴────┘
//! ```
//!
//! Planning is pure and cheap; it never touches pixel data.

mod planner;

pub use planner::{
    max_zoom_for, plan_pyramid, plan_pyramid_with_bounds, PyramidPlan, TileKey, ZoomBounds,
    ZoomLevel,
};
