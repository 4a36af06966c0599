//! Tile records

use pageflow_core::Rect;
use serde::Serialize;
use std::fmt;

/// Deterministic tile identity
///
/// Built from the page index, the scale and the tile's screen rect, so the
/// same tile computed twice at the same scale gets the same id and is not
/// rendered again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TileId(String);

impl TileId {
    /// Id for the tile at `screen_rect` on `page_index` rendered at `scale`
    pub fn new(page_index: u32, scale: f64, screen_rect: &Rect) -> Self {
        Self(format!(
            "p{}-{}-x{}-y{}-w{}-h{}",
            page_index,
            scale,
            screen_rect.left(),
            screen_rect.top(),
            screen_rect.size.width,
            screen_rect.size.height,
        ))
    }

    /// The same tile tagged with a refresh generation, forcing a new render
    pub fn with_refresh(&self, generation: u64) -> Self {
        Self(format!("{}-r{}", self.0, generation))
    }

    /// The id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TileId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Render progress of a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TileStatus {
    Queued,
    Rendering,
    Ready,
    Failed,
}

impl TileStatus {
    /// Whether a tile may move from `self` to `next`
    ///
    /// Status only moves forward. `Failed` is only reachable from
    /// `Rendering`; putting a failed tile back in the queue is the cache's
    /// decision, not a status update.
    pub fn can_transition_to(self, next: TileStatus) -> bool {
        matches!(
            (self, next),
            (TileStatus::Queued, TileStatus::Rendering)
                | (TileStatus::Queued, TileStatus::Ready)
                | (TileStatus::Rendering, TileStatus::Ready)
                | (TileStatus::Rendering, TileStatus::Failed)
        )
    }
}

impl fmt::Display for TileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TileStatus::Queued => "queued",
            TileStatus::Rendering => "rendering",
            TileStatus::Ready => "ready",
            TileStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One raster tile of a page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tile {
    pub id: TileId,
    pub col: u32,
    pub row: u32,
    pub status: TileStatus,

    /// Placement in page pixels at `src_scale`
    pub screen_rect: Rect,

    /// The same region in unscaled page units
    pub page_rect: Rect,

    /// Scale the tile is rendered at
    pub src_scale: f64,

    /// Left over from a previous scale, painted until its replacement is ready
    pub is_fallback: bool,

    /// Failed render attempts so far
    pub attempts: u32,
}

impl Tile {
    /// A new tile waiting to be rendered
    pub fn queued(id: TileId, col: u32, row: u32, screen_rect: Rect, page_rect: Rect, src_scale: f64) -> Self {
        Self {
            id,
            col,
            row,
            status: TileStatus::Queued,
            screen_rect,
            page_rect,
            src_scale,
            is_fallback: false,
            attempts: 0,
        }
    }

    /// Whether the tile's raster is ready to paint
    pub fn is_ready(&self) -> bool {
        self.status == TileStatus::Ready
    }
}
