//! Per-page visibility
//!
//! Intersects every page of the buffered virtual items with the viewport and
//! reports how much of each page is on screen. The visible sub-rectangle is
//! reported twice: in scaled pixels for positioning, and divided by the scale
//! for consumers (tiling) that need scale-independent page coordinates.

use crate::layout::VirtualItem;
use pageflow_core::{Rect, ScrollAxis};
use serde::Serialize;

/// Visible part of a page in page-local coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VisibleRect {
    pub page_x: f64,
    pub page_y: f64,
    pub visible_width: f64,
    pub visible_height: f64,

    /// Scale the coordinates are expressed in (1.0 for the original copy)
    pub scale: f64,
}

impl VisibleRect {
    /// The visible region as a rect in page pixels
    pub fn to_rect(&self) -> Rect {
        Rect::new(self.page_x, self.page_y, self.visible_width, self.visible_height)
    }
}

/// How much of one page intersects the viewport
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VisibilityMetric {
    /// 1-based page number
    pub page_number: u32,

    /// Top-left of the visible part relative to the viewport (pixels)
    pub viewport_x: f64,
    pub viewport_y: f64,

    /// Visible share of the page area, 0..=100
    pub visible_percentage: f64,

    /// Visible rect in unscaled page units
    pub original: VisibleRect,

    /// Visible rect in scaled pixels
    pub scaled: VisibleRect,
}

impl VisibilityMetric {
    /// 0-based index of the page
    pub fn page_index(&self) -> u32 {
        self.page_number.saturating_sub(1)
    }
}

/// Visibility metrics for every page of `items` that intersects `viewport`
///
/// `viewport` is in scaled content pixels. Pages that do not intersect, or
/// intersect only along an edge, are omitted.
pub fn calculate_page_visibility(
    items: &[VirtualItem],
    viewport: &Rect,
    scale: f64,
    axis: ScrollAxis,
) -> Vec<VisibilityMetric> {
    let mut metrics = Vec::new();

    for item in items {
        let item_origin = item.origin(axis).scale(scale);

        for page in &item.page_layouts {
            let page_rect = Rect::new(
                item_origin.x + page.x * scale,
                item_origin.y + page.y * scale,
                page.rotated_width * scale,
                page.rotated_height * scale,
            );

            let total_area = page_rect.area();
            if total_area <= 0.0 {
                tracing::debug!(page = page.page_number, "skipping page with zero area");
                continue;
            }

            let Some(visible) = page_rect.intersection(viewport) else {
                continue;
            };

            let visible_percentage = (visible.area() / total_area * 100.0).clamp(0.0, 100.0);
            let page_x = visible.left() - page_rect.left();
            let page_y = visible.top() - page_rect.top();

            metrics.push(VisibilityMetric {
                page_number: page.page_number,
                viewport_x: visible.left() - viewport.left(),
                viewport_y: visible.top() - viewport.top(),
                visible_percentage,
                original: VisibleRect {
                    page_x: page_x / scale,
                    page_y: page_y / scale,
                    visible_width: visible.size.width / scale,
                    visible_height: visible.size.height / scale,
                    scale: 1.0,
                },
                scaled: VisibleRect {
                    page_x,
                    page_y,
                    visible_width: visible.size.width,
                    visible_height: visible.size.height,
                    scale,
                },
            });
        }
    }

    metrics
}
