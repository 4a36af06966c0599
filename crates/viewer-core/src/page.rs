//! Document page model
//!
//! Pages arrive from the document loader with their unscaled size. Grouping
//! into spreads is decided by an external pagination policy; the helpers at
//! the bottom of this module implement the common policies for callers that
//! have none of their own.

use crate::geometry::{transform_size, Rotation, Size};
use serde::{Deserialize, Serialize};

/// A page of the loaded document
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageObject {
    /// Page index (0-based)
    pub index: u32,

    /// Unscaled page size in points
    pub size: Size,

    /// Intrinsic page rotation, already reflected in `size`
    #[serde(default)]
    pub rotation: Rotation,
}

impl PageObject {
    /// Creates an unrotated page
    pub fn new(index: u32, width: f64, height: f64) -> Self {
        Self { index, size: Size::new(width, height), rotation: Rotation::Degree0 }
    }

    /// 1-based page number
    pub fn number(&self) -> u32 {
        self.index + 1
    }

    /// Page size once the document-wide rotation is applied
    pub fn rotated_size(&self, rotation: Rotation) -> Size {
        transform_size(self.size, rotation, 1.0)
    }
}

/// A page paired with its displayed (rotation-applied) size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedPage {
    pub page: PageObject,
    pub rotated_size: Size,
}

/// Attach rotated sizes to every page of every spread
pub fn pages_with_rotated_size(spreads: &[Vec<PageObject>], rotation: Rotation) -> Vec<Vec<RotatedPage>> {
    spreads
        .iter()
        .map(|spread| {
            spread
                .iter()
                .map(|page| RotatedPage { page: *page, rotated_size: page.rotated_size(rotation) })
                .collect()
        })
        .collect()
}

/// Spread grouping policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpreadMode {
    /// One page per spread
    #[default]
    None,
    /// Pairs starting at the first page: (1,2), (3,4), ...
    Odd,
    /// Cover page alone, then pairs: (1), (2,3), (4,5), ...
    Even,
}

/// Group pages into spreads according to `mode`
pub fn group_spreads(pages: &[PageObject], mode: SpreadMode) -> Vec<Vec<PageObject>> {
    match mode {
        SpreadMode::None => pages.iter().map(|page| vec![*page]).collect(),
        SpreadMode::Odd => pages.chunks(2).map(|chunk| chunk.to_vec()).collect(),
        SpreadMode::Even => {
            let Some((cover, rest)) = pages.split_first() else {
                return Vec::new();
            };
            std::iter::once(vec![*cover]).chain(rest.chunks(2).map(|chunk| chunk.to_vec())).collect()
        }
    }
}
