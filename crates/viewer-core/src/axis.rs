//! Scroll axis selection
//!
//! Vertical and horizontal layouts run the same algorithms with the roles of
//! x/y and width/height exchanged. `ScrollAxis` is the accessor pair that
//! picks the main (scrolling) and cross components.

use crate::geometry::{Point, Size};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction in which the document scrolls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollAxis {
    #[default]
    Vertical,
    Horizontal,
}

impl ScrollAxis {
    /// Component of `point` along the scroll direction
    pub fn main(self, point: Point) -> f64 {
        match self {
            ScrollAxis::Vertical => point.y,
            ScrollAxis::Horizontal => point.x,
        }
    }

    /// Component of `point` across the scroll direction
    pub fn cross(self, point: Point) -> f64 {
        match self {
            ScrollAxis::Vertical => point.x,
            ScrollAxis::Horizontal => point.y,
        }
    }

    /// Extent of `size` along the scroll direction
    pub fn main_size(self, size: Size) -> f64 {
        match self {
            ScrollAxis::Vertical => size.height,
            ScrollAxis::Horizontal => size.width,
        }
    }

    /// Extent of `size` across the scroll direction
    pub fn cross_size(self, size: Size) -> f64 {
        match self {
            ScrollAxis::Vertical => size.width,
            ScrollAxis::Horizontal => size.height,
        }
    }

    /// Build a point from main and cross components
    pub fn point(self, main: f64, cross: f64) -> Point {
        match self {
            ScrollAxis::Vertical => Point::new(cross, main),
            ScrollAxis::Horizontal => Point::new(main, cross),
        }
    }

    /// Build a size from main and cross extents
    pub fn size(self, main: f64, cross: f64) -> Size {
        match self {
            ScrollAxis::Vertical => Size::new(cross, main),
            ScrollAxis::Horizontal => Size::new(main, cross),
        }
    }
}

impl fmt::Display for ScrollAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrollAxis::Vertical => write!(f, "vertical"),
            ScrollAxis::Horizontal => write!(f, "horizontal"),
        }
    }
}

impl FromStr for ScrollAxis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vertical" | "v" => Ok(ScrollAxis::Vertical),
            "horizontal" | "h" => Ok(ScrollAxis::Horizontal),
            other => Err(format!("unknown scroll axis: {other}")),
        }
    }
}
