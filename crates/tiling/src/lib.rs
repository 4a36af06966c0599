//! Pageflow Tiling
//!
//! Tile-based progressive rendering: per-page tile grids, the tile cache
//! with its zoom fallback generation, and the [`TilingController`] that
//! issues renders and folds their results back into the cache.

pub mod controller;
pub mod grid;
pub mod state;
pub mod tile;

pub use controller::{RenderTaskHandle, RenderTileOptions, RenderedTile, TilingController, TilingError};
pub use grid::calculate_tiles_for_page;
pub use state::{RemovedTile, TilingState, Transition};
pub use tile::{Tile, TileId, TileStatus};
