//! Visible range search
//!
//! Finds the contiguous run of virtual items that intersects the viewport
//! along the scroll axis, widened by a buffer of neighbours that are kept
//! rendered ahead of time.

use crate::layout::VirtualItem;
use serde::Serialize;

/// Inclusive range of virtual item indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VisibleRange {
    pub start: usize,
    pub end: usize,
}

impl VisibleRange {
    /// Number of items in the range
    pub fn len(&self) -> usize {
        (self.end + 1).saturating_sub(self.start)
    }

    /// True when `end` lies before `start`
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Whether item `index` falls inside the range
    pub fn contains(&self, index: usize) -> bool {
        (self.start..=self.end).contains(&index)
    }

    /// The item indexes, in order
    pub fn indexes(&self) -> std::ops::RangeInclusive<usize> {
        self.start..=self.end
    }
}

/// Buffered range of items intersecting `[viewport_start, viewport_start + client_size]`
///
/// `viewport_start` and `client_size` are scaled pixels in content space;
/// item geometry is multiplied by `scale` before comparison. The result
/// always contains every item that geometrically intersects the viewport.
/// A viewport entirely before or after the content collapses onto the
/// first or last item. Returns `None` only when there are no items.
pub fn visible_range(
    items: &[VirtualItem],
    viewport_start: f64,
    client_size: f64,
    scale: f64,
    buffer: usize,
) -> Option<VisibleRange> {
    if items.is_empty() {
        return None;
    }

    let viewport_end = viewport_start + client_size;
    let last = items.len() - 1;

    let mut start = 0;
    while start < items.len() && items[start].end() * scale <= viewport_start {
        start += 1;
    }

    let mut end = start;
    while end < items.len() && items[end].offset * scale <= viewport_end {
        end += 1;
    }

    // Past the content: anchor on the last item.
    let start = start.min(last);
    // Before the content (or in a gap): keep at least the start item.
    let end = end.saturating_sub(1).max(start);

    Some(VisibleRange { start: start.saturating_sub(buffer), end: (end + buffer).min(last) })
}
