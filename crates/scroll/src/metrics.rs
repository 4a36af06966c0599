//! Scroll metrics snapshot
//!
//! Composes the visible range search and the per-page visibility pass into a
//! single immutable [`ScrollMetrics`] value, picks the current page, and
//! computes the spacer sizes the host needs to keep the scroll extent right
//! while only the buffered window of items is mounted.

use crate::layout::DocumentLayout;
use crate::range::visible_range;
use crate::visibility::{calculate_page_visibility, VisibilityMetric};
use pageflow_core::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Two visibility percentages closer than this are treated as a tie
pub const VISIBILITY_EPSILON: f64 = 1e-6;

/// Viewport geometry reported by the host scroll container
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewportMetrics {
    pub scroll_top: f64,
    pub scroll_left: f64,
    pub client_width: f64,
    pub client_height: f64,
    pub scroll_width: f64,
    pub scroll_height: f64,
}

impl ViewportMetrics {
    /// Viewport of the given client size scrolled to the top-left corner
    pub fn new(client_width: f64, client_height: f64) -> Self {
        Self { client_width, client_height, ..Self::default() }
    }

    /// Set the container scroll offset
    pub fn with_scroll(mut self, scroll_left: f64, scroll_top: f64) -> Self {
        self.scroll_left = scroll_left;
        self.scroll_top = scroll_top;
        self
    }

    /// The viewport expressed in content coordinates
    ///
    /// Content starts `viewport_gap` pixels into the scroll container.
    pub fn content_rect(&self, viewport_gap: f64) -> Rect {
        Rect::new(
            self.scroll_left - viewport_gap,
            self.scroll_top - viewport_gap,
            self.client_width,
            self.client_height,
        )
    }
}

/// Immutable snapshot of what the viewport shows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrollMetrics {
    /// 1-based number of the most visible page
    pub current_page: u32,

    /// Page numbers with any visible area, in layout order
    pub visible_pages: Vec<u32>,

    pub page_visibility_metrics: Vec<VisibilityMetric>,

    /// Virtual item indexes of the buffered window that should be mounted
    pub rendered_page_indexes: Vec<usize>,

    /// Raw scroll position of the container
    pub scroll_offset: Point,

    /// Scaled space reserved before the first mounted item
    pub start_spacing: f64,

    /// Scaled space reserved after the last mounted item
    pub end_spacing: f64,
}

impl ScrollMetrics {
    /// Snapshot of a document with nothing to show
    pub fn empty(scroll_offset: Point) -> Self {
        Self {
            current_page: 1,
            visible_pages: Vec::new(),
            page_visibility_metrics: Vec::new(),
            rendered_page_indexes: Vec::new(),
            scroll_offset,
            start_spacing: 0.0,
            end_spacing: 0.0,
        }
    }

    /// Visibility of `page_number`, if it is visible
    pub fn visibility(&self, page_number: u32) -> Option<&VisibilityMetric> {
        self.page_visibility_metrics.iter().find(|metric| metric.page_number == page_number)
    }
}

impl Default for ScrollMetrics {
    fn default() -> Self {
        Self::empty(Point::default())
    }
}

/// The most visible page
///
/// Percentages within [`VISIBILITY_EPSILON`] of the maximum count as tied and
/// the lowest page number among them wins. With nothing visible the current
/// page is 1.
pub fn determine_current_page(metrics: &[VisibilityMetric]) -> u32 {
    let Some(max) = metrics.iter().map(|metric| metric.visible_percentage).reduce(f64::max) else {
        return 1;
    };

    metrics
        .iter()
        .filter(|metric| max - metric.visible_percentage <= VISIBILITY_EPSILON)
        .map(|metric| metric.page_number)
        .min()
        .unwrap_or(1)
}

/// Compute a full metrics snapshot for `viewport`
pub fn compute_scroll_metrics(
    viewport: &ViewportMetrics,
    layout: &DocumentLayout,
    scale: f64,
    viewport_gap: f64,
    buffer: usize,
) -> ScrollMetrics {
    let scroll_offset = Point::new(viewport.scroll_left, viewport.scroll_top);
    let axis = layout.axis;
    let items = &layout.virtual_items;
    let content = viewport.content_rect(viewport_gap);

    let Some(range) = visible_range(
        items,
        axis.main(content.origin),
        axis.main_size(content.size),
        scale,
        buffer,
    ) else {
        return ScrollMetrics::empty(scroll_offset);
    };

    let window = &items[range.start..=range.end];
    let page_visibility_metrics = calculate_page_visibility(window, &content, scale, axis);
    let visible_pages = page_visibility_metrics.iter().map(|metric| metric.page_number).collect();
    let current_page = determine_current_page(&page_visibility_metrics);

    let content_end = items.last().map_or(0.0, |item| item.end());
    let start_spacing = window[0].offset * scale;
    let end_spacing = (content_end - window[window.len() - 1].end()) * scale;

    tracing::trace!(
        start = range.start,
        end = range.end,
        current_page,
        "computed scroll metrics"
    );

    ScrollMetrics {
        current_page,
        visible_pages,
        page_visibility_metrics,
        rendered_page_indexes: range.indexes().collect(),
        scroll_offset,
        start_spacing,
        end_spacing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visibility::VisibleRect;
    use pageflow_core::{group_spreads, pages_with_rotated_size, PageObject, Rotation, ScrollAxis, SpreadMode};

    fn metric(page_number: u32, visible_percentage: f64) -> VisibilityMetric {
        let rect = VisibleRect { page_x: 0.0, page_y: 0.0, visible_width: 0.0, visible_height: 0.0, scale: 1.0 };
        VisibilityMetric {
            page_number,
            viewport_x: 0.0,
            viewport_y: 0.0,
            visible_percentage,
            original: rect,
            scaled: rect,
        }
    }

    fn document(count: u32, axis: ScrollAxis) -> DocumentLayout {
        let pages: Vec<PageObject> = (0..count).map(|index| PageObject::new(index, 600.0, 800.0)).collect();
        let spreads = pages_with_rotated_size(&group_spreads(&pages, SpreadMode::None), Rotation::Degree0);
        DocumentLayout::build(&spreads, 10.0, axis)
    }

    #[test]
    fn test_tie_resolves_to_lowest_page() {
        let metrics = [metric(4, 50.0), metric(3, 50.0)];
        assert_eq!(determine_current_page(&metrics), 3);
    }

    #[test]
    fn test_near_tie_within_epsilon_is_still_a_tie() {
        let metrics = [metric(3, 50.0 - VISIBILITY_EPSILON / 2.0), metric(4, 50.0)];
        assert_eq!(determine_current_page(&metrics), 3);

        let metrics = [metric(3, 49.0), metric(4, 50.0)];
        assert_eq!(determine_current_page(&metrics), 4);
    }

    #[test]
    fn test_nothing_visible_defaults_to_first_page() {
        assert_eq!(determine_current_page(&[]), 1);
    }

    #[test]
    fn test_metrics_for_the_top_of_the_document() {
        let layout = document(10, ScrollAxis::Vertical);
        let viewport = ViewportMetrics::new(800.0, 1000.0);

        let metrics = compute_scroll_metrics(&viewport, &layout, 1.0, 10.0, 2);
        assert_eq!(metrics.current_page, 1);
        assert_eq!(metrics.visible_pages, vec![1, 2]);
        assert_eq!(metrics.rendered_page_indexes, vec![0, 1, 2, 3]);
        assert_eq!(metrics.start_spacing, 0.0);
        // content ends at 8090, item 3 ends at 3230
        assert_eq!(metrics.end_spacing, 4860.0);
    }

    #[test]
    fn test_viewport_gap_shifts_content_coordinates() {
        let layout = document(3, ScrollAxis::Vertical);
        // container scrolled so that page 2 starts exactly at the top
        let viewport = ViewportMetrics::new(600.0, 800.0).with_scroll(10.0, 820.0);

        let metrics = compute_scroll_metrics(&viewport, &layout, 1.0, 10.0, 0);
        assert_eq!(metrics.visible_pages, vec![2]);
        assert_eq!(metrics.page_visibility_metrics[0].visible_percentage, 100.0);
        assert_eq!(metrics.scroll_offset, Point::new(10.0, 820.0));
    }

    #[test]
    fn test_spacing_accounts_for_scale() {
        let layout = document(10, ScrollAxis::Vertical);
        let viewport = ViewportMetrics::new(800.0, 1000.0).with_scroll(0.0, 8110.0);

        let metrics = compute_scroll_metrics(&viewport, &layout, 2.0, 10.0, 1);
        // content y 8100 at 2x falls on item 5 (8100..9700)
        assert_eq!(metrics.current_page, 6);
        assert_eq!(metrics.rendered_page_indexes, vec![4, 5, 6]);
        assert_eq!(metrics.start_spacing, 4.0 * 810.0 * 2.0);
        assert_eq!(metrics.end_spacing, (8090.0 - 6.0 * 810.0 - 800.0) * 2.0);
    }

    #[test]
    fn test_horizontal_metrics_use_scroll_left() {
        let layout = document(4, ScrollAxis::Horizontal);
        let viewport = ViewportMetrics::new(1000.0, 900.0).with_scroll(620.0, 0.0);

        let metrics = compute_scroll_metrics(&viewport, &layout, 1.0, 10.0, 0);
        // content x 610..1610: page 2 fully, page 3 partially
        assert_eq!(metrics.visible_pages, vec![2, 3]);
        assert_eq!(metrics.current_page, 2);
    }

    #[test]
    fn test_empty_layout_yields_empty_metrics() {
        let layout = DocumentLayout::empty(ScrollAxis::Vertical, 10.0);
        let metrics = compute_scroll_metrics(&ViewportMetrics::new(800.0, 600.0), &layout, 1.0, 10.0, 2);
        assert_eq!(metrics, ScrollMetrics::empty(Point::default()));
    }
}
