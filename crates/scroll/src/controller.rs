//! Scroll capability
//!
//! [`ScrollController`] owns the current document layout and the latest
//! metrics snapshot, and publishes changes to subscribers. The host pushes
//! viewport changes in (throttled), and receives [`ScrollRequest`]s back when
//! navigation asks it to move the scroll container.

use crate::layout::{DocumentLayout, VirtualItem};
use crate::metrics::{compute_scroll_metrics, ScrollMetrics, ViewportMetrics};
use pageflow_core::{
    pages_with_rotated_size, transform_position, transform_rect, Emitter, EventControl,
    EventControlOptions, ListenerId, PageObject, Point, Rect, Rotation, ScrollAxis, ScrollConfig,
    Size,
};
use serde::Serialize;
use std::time::Instant;

/// How the host should animate a scroll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollBehavior {
    #[default]
    Smooth,
    Instant,
}

/// Options for [`ScrollController::scroll_to_page`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollToPageOptions {
    /// 1-based page number
    pub page_number: u32,
    pub behavior: ScrollBehavior,

    /// Position inside the page (unscaled, unrotated) to bring into view
    pub page_coordinates: Option<Point>,

    /// Ask the host to center the target in the viewport
    pub center: bool,
}

impl ScrollToPageOptions {
    /// Navigate to `page_number` (1-based) with a smooth scroll
    pub fn new(page_number: u32) -> Self {
        Self { page_number, behavior: ScrollBehavior::Smooth, page_coordinates: None, center: false }
    }

    /// Override the scroll animation
    pub fn with_behavior(mut self, behavior: ScrollBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Bring a point inside the page into view instead of its top-left corner
    pub fn with_page_coordinates(mut self, coordinates: Point) -> Self {
        self.page_coordinates = Some(coordinates);
        self
    }

    /// Ask the host to center the target
    pub fn centered(mut self) -> Self {
        self.center = true;
        self
    }
}

/// A scroll the host should perform on its container
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScrollRequest {
    /// Target scroll position in container coordinates
    pub position: Point,
    pub behavior: ScrollBehavior,
    pub center: bool,
}

/// Progress of a navigation started by the controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageChangeState {
    pub is_changing: bool,
    pub target_page: u32,
    pub from_page: u32,

    /// When the navigation started
    #[serde(skip)]
    pub started_at: Option<Instant>,
}

impl Default for PageChangeState {
    fn default() -> Self {
        Self { is_changing: false, target_page: 1, from_page: 1, started_at: None }
    }
}

/// Published whenever the current page changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageChangePayload {
    pub page_number: u32,
    pub total_pages: u32,
}

/// Published whenever the virtual items are rebuilt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutChangePayload {
    pub virtual_items: Vec<VirtualItem>,
    pub total_content_size: Size,
}

/// What the host needs to mount the buffered window of items
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrollerLayout {
    pub axis: ScrollAxis,
    pub start_spacing: f64,
    pub end_spacing: f64,

    /// Scaled size of the whole document
    pub total_width: f64,
    pub total_height: f64,

    pub page_gap: f64,
    pub scale: f64,

    /// Items that should be mounted, in order
    pub items: Vec<VirtualItem>,
}

/// Scroll state and navigation for one document view
#[derive(Debug)]
pub struct ScrollController {
    config: ScrollConfig,
    spreads: Vec<Vec<PageObject>>,
    total_pages: u32,
    scale: f64,
    rotation: Rotation,
    layout: DocumentLayout,
    viewport: ViewportMetrics,
    viewport_control: EventControl<ViewportMetrics>,
    metrics: ScrollMetrics,
    current_page: u32,
    layout_ready: bool,
    page_change_state: PageChangeState,

    scroll_events: Emitter<ScrollMetrics>,
    page_change_events: Emitter<PageChangePayload>,
    layout_events: Emitter<LayoutChangePayload>,
    page_change_state_events: Emitter<PageChangeState>,
    layout_ready_events: Emitter<bool>,
}

impl ScrollController {
    /// Creates a controller with no document
    pub fn new(config: ScrollConfig) -> Self {
        let viewport_control = EventControl::new(EventControlOptions::throttle(config.throttle()));
        let layout = DocumentLayout::empty(config.axis, config.page_gap);

        Self {
            config,
            spreads: Vec::new(),
            total_pages: 0,
            scale: 1.0,
            rotation: Rotation::Degree0,
            layout,
            viewport: ViewportMetrics::default(),
            viewport_control,
            metrics: ScrollMetrics::default(),
            current_page: 1,
            layout_ready: false,
            page_change_state: PageChangeState::default(),
            scroll_events: Emitter::new(),
            page_change_events: Emitter::new(),
            layout_events: Emitter::new(),
            page_change_state_events: Emitter::new(),
            layout_ready_events: Emitter::new(),
        }
    }

    /// Active scroll configuration
    pub fn config(&self) -> &ScrollConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Inputs
    // ------------------------------------------------------------------

    /// Load a document, already grouped into spreads
    ///
    /// Listeners get the new layout and metrics first, then a page-change
    /// payload carrying the new page count, even when the current page
    /// number stays the same.
    pub fn set_document(&mut self, spreads: Vec<Vec<PageObject>>, now: Instant) {
        self.total_pages = spreads.iter().map(|spread| spread.len() as u32).sum();
        self.spreads = spreads;
        tracing::debug!(total_pages = self.total_pages, spreads = self.spreads.len(), "document set");

        let before = self.current_page;
        self.refresh_all(now);
        if self.current_page == before {
            self.emit_page_change(now);
        }
    }

    /// Switch between vertical and horizontal scrolling
    pub fn set_axis(&mut self, axis: ScrollAxis, now: Instant) {
        if self.config.axis == axis {
            return;
        }
        self.config.axis = axis;
        self.refresh_all(now);
    }

    /// Apply a zoom level
    ///
    /// Metrics are recomputed immediately; pending throttled viewport
    /// updates are not waited for.
    pub fn set_scale(&mut self, scale: f64, now: Instant) {
        if scale == self.scale || scale <= 0.0 || !scale.is_finite() {
            return;
        }
        self.scale = scale;
        let metrics = self.compute_metrics(&self.viewport);
        self.commit_metrics(metrics, now);
    }

    /// Apply a page rotation and rebuild the layout
    pub fn set_rotation(&mut self, rotation: Rotation, now: Instant) {
        if self.rotation == rotation {
            return;
        }
        self.rotation = rotation;
        self.refresh_all(now);
    }

    /// Feed a viewport change from the host
    ///
    /// The latest viewport is always remembered; recomputation is throttled
    /// and any trailing update is released by [`poll`](Self::poll).
    pub fn on_viewport_change(&mut self, viewport: ViewportMetrics, now: Instant) {
        self.viewport = viewport;
        if let Some(viewport) = self.viewport_control.handle(viewport, now) {
            let metrics = self.compute_metrics(&viewport);
            self.commit_metrics(metrics, now);
        }
    }

    /// Flush throttled work that has come due
    pub fn poll(&mut self, now: Instant) {
        if let Some(viewport) = self.viewport_control.poll(now) {
            let metrics = self.compute_metrics(&viewport);
            self.commit_metrics(metrics, now);
        }
        self.scroll_events.poll(now);
    }

    /// Earliest time at which [`poll`](Self::poll) has something to do
    pub fn next_due(&self) -> Option<Instant> {
        [self.viewport_control.next_due(), self.scroll_events.next_due()].into_iter().flatten().min()
    }

    /// Report whether the host is still animating a smooth scroll
    pub fn on_scroll_activity(&mut self, is_smooth_scrolling: bool, now: Instant) {
        if self.page_change_state.is_changing && !is_smooth_scrolling {
            self.complete_page_change(now);
        }
    }

    /// Mark the host as mounted, jumping to the configured initial page
    pub fn set_layout_ready(&mut self, now: Instant) -> Option<ScrollRequest> {
        if self.layout_ready {
            return None;
        }
        self.layout_ready = true;
        self.layout_ready_events.emit_at(true, now);

        let page_number = self.config.initial_page?;
        self.scroll_to_page(ScrollToPageOptions::new(page_number).with_behavior(ScrollBehavior::Instant), now)
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Subscribe to metrics snapshots, optionally throttled or debounced
    pub fn on_scroll(
        &mut self,
        handler: impl FnMut(&ScrollMetrics) + 'static,
        options: Option<EventControlOptions>,
    ) -> ListenerId {
        match options {
            Some(options) => self.scroll_events.on_controlled(handler, options),
            None => self.scroll_events.on(handler),
        }
    }

    /// Remove a metrics subscriber
    pub fn off_scroll(&mut self, id: ListenerId) -> bool {
        self.scroll_events.off(id)
    }

    /// Subscribe to current-page changes
    pub fn on_page_change(&mut self, handler: impl FnMut(&PageChangePayload) + 'static) -> ListenerId {
        self.page_change_events.on(handler)
    }

    /// Remove a page-change subscriber
    pub fn off_page_change(&mut self, id: ListenerId) -> bool {
        self.page_change_events.off(id)
    }

    /// Subscribe to layout rebuilds
    pub fn on_layout_change(&mut self, handler: impl FnMut(&LayoutChangePayload) + 'static) -> ListenerId {
        self.layout_events.on(handler)
    }

    /// Remove a layout subscriber
    pub fn off_layout_change(&mut self, id: ListenerId) -> bool {
        self.layout_events.off(id)
    }

    /// Subscribe to navigation progress
    pub fn on_page_change_state(&mut self, handler: impl FnMut(&PageChangeState) + 'static) -> ListenerId {
        self.page_change_state_events.on(handler)
    }

    /// Subscribe to the host's layout-ready signal
    pub fn on_layout_ready(&mut self, handler: impl FnMut(&bool) + 'static) -> ListenerId {
        self.layout_ready_events.on(handler)
    }

    /// Drop every subscriber
    pub fn clear_listeners(&mut self) {
        self.scroll_events.clear();
        self.page_change_events.clear();
        self.layout_events.clear();
        self.page_change_state_events.clear();
        self.layout_ready_events.clear();
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Start navigating to a page
    ///
    /// Returns the scroll the host should perform, or `None` when the page is
    /// not part of the layout (the page change completes immediately).
    pub fn scroll_to_page(&mut self, options: ScrollToPageOptions, now: Instant) -> Option<ScrollRequest> {
        self.start_page_change(options.page_number, options.behavior, now);

        match self.get_scroll_position_for_page(options.page_number, options.page_coordinates) {
            Some(position) => Some(ScrollRequest { position, behavior: options.behavior, center: options.center }),
            None => {
                tracing::warn!(page = options.page_number, "cannot scroll to page outside the layout");
                self.complete_page_change(now);
                None
            }
        }
    }

    /// Navigate to the first page of the next spread
    pub fn scroll_to_next_page(&mut self, behavior: ScrollBehavior, now: Instant) -> Option<ScrollRequest> {
        let index = self.layout.item_index_for_page(self.current_page)?;
        let next = self.layout.virtual_items.get(index + 1)?;
        let page_number = *next.page_numbers.first()?;
        self.scroll_to_page(ScrollToPageOptions::new(page_number).with_behavior(behavior), now)
    }

    /// Navigate to the first page of the previous spread
    pub fn scroll_to_previous_page(&mut self, behavior: ScrollBehavior, now: Instant) -> Option<ScrollRequest> {
        let index = self.layout.item_index_for_page(self.current_page)?;
        let previous = self.layout.virtual_items.get(index.checked_sub(1)?)?;
        let page_number = *previous.page_numbers.first()?;
        self.scroll_to_page(ScrollToPageOptions::new(page_number).with_behavior(behavior), now)
    }

    /// Container scroll position that brings a page (or a point in it) to the top-left
    pub fn get_scroll_position_for_page(&self, page_number: u32, page_coordinates: Option<Point>) -> Option<Point> {
        let page_rect = self.layout.page_rect(page_number)?;
        let base = page_rect.origin.scale(self.scale);
        let offset = page_coordinates
            .map(|point| transform_position(page_rect.size, point, self.rotation, self.scale))
            .unwrap_or_default();

        Some(Point::new(
            base.x + offset.x + self.config.viewport_gap,
            base.y + offset.y + self.config.viewport_gap,
        ))
    }

    /// Map a rect in page space to scaled content coordinates
    ///
    /// `scale` and `rotation` default to the controller's current values.
    pub fn get_rect_position_for_page(
        &self,
        page_index: u32,
        rect: Rect,
        scale: Option<f64>,
        rotation: Option<Rotation>,
    ) -> Option<Rect> {
        let scale = scale.unwrap_or(self.scale);
        let rotation = rotation.unwrap_or(self.rotation);
        let page_rect = self.layout.page_rect(page_index + 1)?;
        let base = page_rect.origin.scale(scale);
        let transformed = transform_rect(page_rect.size, rect, rotation, scale);

        Some(Rect {
            origin: Point::new(base.x + transformed.origin.x, base.y + transformed.origin.y),
            size: transformed.size,
        })
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Metrics for `viewport`, or for the last viewport the host reported
    pub fn get_metrics(&self, viewport: Option<&ViewportMetrics>) -> ScrollMetrics {
        self.compute_metrics(viewport.unwrap_or(&self.viewport))
    }

    /// Last published metrics snapshot
    pub fn metrics(&self) -> &ScrollMetrics {
        &self.metrics
    }

    /// Current page (1-based)
    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Number of pages in the document
    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    /// Current zoom level
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Current page rotation
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Current scroll direction
    pub fn axis(&self) -> ScrollAxis {
        self.config.axis
    }

    /// Gap between spreads, in unscaled points
    pub fn page_gap(&self) -> f64 {
        self.config.page_gap
    }

    /// Progress of the last navigation
    pub fn page_change_state(&self) -> PageChangeState {
        self.page_change_state
    }

    /// Whether the host reported its layout as mounted
    pub fn is_layout_ready(&self) -> bool {
        self.layout_ready
    }

    /// The laid-out virtual items
    pub fn document_layout(&self) -> &DocumentLayout {
        &self.layout
    }

    /// Snapshot of the virtual items and content size
    pub fn layout(&self) -> LayoutChangePayload {
        LayoutChangePayload {
            virtual_items: self.layout.virtual_items.clone(),
            total_content_size: self.layout.total_content_size,
        }
    }

    /// Buffered window of items the host should mount, with spacers
    pub fn scroller_layout(&self) -> ScrollerLayout {
        let total = self.layout.total_content_size.scale(self.scale);
        ScrollerLayout {
            axis: self.config.axis,
            start_spacing: self.metrics.start_spacing,
            end_spacing: self.metrics.end_spacing,
            total_width: total.width,
            total_height: total.height,
            page_gap: self.config.page_gap,
            scale: self.scale,
            items: self
                .metrics
                .rendered_page_indexes
                .iter()
                .filter_map(|index| self.layout.virtual_items.get(*index).cloned())
                .collect(),
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn compute_metrics(&self, viewport: &ViewportMetrics) -> ScrollMetrics {
        compute_scroll_metrics(viewport, &self.layout, self.scale, self.config.viewport_gap, self.config.buffer_size)
    }

    fn commit_metrics(&mut self, metrics: ScrollMetrics, now: Instant) {
        let page_changed = metrics.current_page != self.current_page;
        self.current_page = metrics.current_page;
        self.metrics = metrics.clone();
        self.scroll_events.emit_at(metrics, now);
        if page_changed {
            self.emit_page_change(now);
        }
    }

    fn emit_page_change(&mut self, now: Instant) {
        let payload = PageChangePayload { page_number: self.current_page, total_pages: self.total_pages };
        self.page_change_events.emit_at(payload, now);
    }

    /// Rebuild the layout from the stored spreads and recompute metrics
    fn refresh_all(&mut self, now: Instant) {
        let spreads = pages_with_rotated_size(&self.spreads, self.rotation);
        self.layout = DocumentLayout::build(&spreads, self.config.page_gap, self.config.axis);
        tracing::debug!(
            items = self.layout.virtual_items.len(),
            axis = %self.config.axis,
            "layout rebuilt"
        );

        self.layout_events.emit_at(self.layout(), now);
        let metrics = self.compute_metrics(&self.viewport);
        self.commit_metrics(metrics, now);
    }

    fn start_page_change(&mut self, target_page: u32, behavior: ScrollBehavior, now: Instant) {
        self.set_page_change_state(
            PageChangeState { is_changing: true, target_page, from_page: self.current_page, started_at: Some(now) },
            now,
        );

        if behavior == ScrollBehavior::Instant {
            self.complete_page_change(now);
        }
    }

    fn complete_page_change(&mut self, now: Instant) {
        if !self.page_change_state.is_changing {
            return;
        }
        self.set_page_change_state(PageChangeState { is_changing: false, ..self.page_change_state }, now);
    }

    fn set_page_change_state(&mut self, state: PageChangeState, now: Instant) {
        self.page_change_state = state;
        self.page_change_state_events.emit_at(state, now);
    }
}

impl Default for ScrollController {
    fn default() -> Self {
        Self::new(ScrollConfig::default())
    }
}
