//! Pageflow Scroll
//!
//! Virtualized scrolling for paginated documents: virtual item layout,
//! visible range search with buffering, per-page visibility, the metrics
//! snapshot and the [`ScrollController`] that ties them to a host viewport.

pub mod controller;
pub mod layout;
pub mod metrics;
pub mod range;
pub mod visibility;

pub use controller::{
    LayoutChangePayload, PageChangePayload, PageChangeState, ScrollBehavior, ScrollController,
    ScrollRequest, ScrollToPageOptions, ScrollerLayout,
};
pub use layout::{create_virtual_items, total_content_size, DocumentLayout, PageLayout, VirtualItem};
pub use metrics::{
    compute_scroll_metrics, determine_current_page, ScrollMetrics, ViewportMetrics, VISIBILITY_EPSILON,
};
pub use range::{visible_range, VisibleRange};
pub use visibility::{calculate_page_visibility, VisibilityMetric, VisibleRect};
