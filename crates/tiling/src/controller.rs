//! Tiling capability
//!
//! [`TilingController`] turns scroll metrics into tile grids, keeps the
//! [`TilingState`] cache, issues render tasks to a [`RenderEngine`] and folds
//! their results back in. Every published state is delivered to
//! [`on_tile_rendering`](TilingController::on_tile_rendering) listeners.
//!
//! Tiles that leave the cache have their task cancelled right away, and a
//! completion is applied only if its tile is still cached, so a late raster
//! can never land on the wrong generation.

use crate::grid::calculate_tiles_for_page;
use crate::state::{RemovedTile, TilingState, Transition};
use crate::tile::{Tile, TileId, TileStatus};
use pageflow_core::{ConfigError, Emitter, EventControl, EventControlOptions, ListenerId, PageObject, Rect, Rotation, TilingConfig};
use pageflow_scheduler::{
    CancellationToken, RenderEngine, RenderError, RenderRequest, RenderedRaster, TaskTracker, TrackerStats,
};
use pageflow_scroll::ScrollMetrics;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why a tile render was not started
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TilingError {
    #[error("tiling is disabled")]
    Disabled,

    #[error("page {0} has no tiles")]
    UnknownPage(u32),

    #[error("page {page_index} has no tile {tile_id}")]
    UnknownTile { page_index: u32, tile_id: TileId },

    #[error("tile {tile_id} on page {page_index} is already rendering")]
    AlreadyRendering { page_index: u32, tile_id: TileId },

    #[error("tile {tile_id} on page {page_index} is {status}, not queued")]
    NotQueued { page_index: u32, tile_id: TileId, status: TileStatus },
}

/// Options for [`TilingController::render_tile`]
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTileOptions {
    pub page_index: u32,
    pub tile_id: TileId,

    /// Device pixel ratio of the paint surface
    pub dpr: f64,
}

/// A render that was handed to the engine
#[derive(Debug, Clone)]
pub struct RenderTaskHandle {
    pub page_index: u32,
    pub tile_id: TileId,
    pub token: CancellationToken,
}

impl RenderTaskHandle {
    /// Cancel the render; its tile is marked failed when the result comes back
    pub fn abort(&self) {
        self.token.cancel();
    }
}

/// A finished raster, ready for the paint surface
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTile {
    pub page_index: u32,
    pub tile_id: TileId,

    /// Where the raster goes, in page pixels at the tile's scale
    pub screen_rect: Rect,
    pub raster: RenderedRaster,
    pub elapsed: Duration,
}

type TaskKey = (u32, TileId);

#[derive(Debug)]
pub struct TilingController<E> {
    config: TilingConfig,
    engine: E,
    pages: Vec<PageObject>,
    scale: f64,
    rotation: Rotation,
    state: TilingState,
    tracker: TaskTracker<TaskKey>,
    scroll_control: EventControl<ScrollMetrics>,

    /// Refresh generation per page, appended to tile ids
    refreshed: HashMap<u32, u64>,
    refresh_counter: u64,

    tile_events: Emitter<TilingState>,
}

impl<E: RenderEngine> TilingController<E> {
    /// Build a controller around `engine`
    ///
    /// # Errors
    /// Returns an error if `config` would produce a degenerate tile grid.
    pub fn new(config: TilingConfig, engine: E) -> Result<Self, ConfigError> {
        config.validate()?;
        let scroll_control = EventControl::new(EventControlOptions::trailing(config.throttle()));
        let tracker = TaskTracker::new(config.render_timeout());

        Ok(Self {
            config,
            engine,
            pages: Vec::new(),
            scale: 1.0,
            rotation: Rotation::Degree0,
            state: TilingState::new(),
            tracker,
            scroll_control,
            refreshed: HashMap::new(),
            refresh_counter: 0,
            tile_events: Emitter::new(),
        })
    }

    /// Active tiling configuration
    pub fn config(&self) -> &TilingConfig {
        &self.config
    }

    /// The engine renders are issued to
    pub fn engine(&self) -> &E {
        &self.engine
    }

    // ------------------------------------------------------------------
    // Inputs
    // ------------------------------------------------------------------

    /// Load a document's pages; every cached tile and in-flight render is dropped
    pub fn set_document(&mut self, pages: Vec<PageObject>) {
        tracing::debug!(pages = pages.len(), "tiling document set");
        self.pages = pages;
        self.refreshed.clear();
        self.scroll_control.cancel();

        let cancelled = self.tracker.cancel_all();
        if cancelled > 0 {
            tracing::debug!(cancelled, "cancelled renders for previous document");
        }
        self.commit(TilingState::new());
    }

    /// Apply a zoom level and recompute every visible grid immediately
    ///
    /// `metrics` must already reflect the new scale. A pending throttled
    /// recomputation is dropped since it was computed for the old one.
    pub fn set_scale(&mut self, scale: f64, metrics: &ScrollMetrics) {
        if scale <= 0.0 || !scale.is_finite() {
            tracing::warn!(scale, "ignoring invalid scale");
            return;
        }
        self.scale = scale;
        self.scroll_control.cancel();
        self.calculate_visible_tiles(metrics);
    }

    /// Apply a page rotation and recompute every visible grid immediately
    pub fn set_rotation(&mut self, rotation: Rotation, metrics: &ScrollMetrics) {
        self.rotation = rotation;
        self.scroll_control.cancel();
        self.calculate_visible_tiles(metrics);
    }

    /// Turn tiling on or off
    ///
    /// Disabling cancels every render and publishes an empty state.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.config.enabled == enabled {
            return;
        }
        self.config.enabled = enabled;
        tracing::debug!(enabled, "tiling toggled");

        if !enabled {
            self.scroll_control.cancel();
            self.tracker.cancel_all();
            let cleared = self.state.clear();
            self.apply(cleared);
        }
    }

    /// Whether tiles are being computed
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Feed scroll metrics; tile recomputation is throttled (trailing)
    pub fn on_scroll(&mut self, metrics: ScrollMetrics, now: Instant) {
        if !self.config.enabled {
            return;
        }
        if let Some(metrics) = self.scroll_control.handle(metrics, now) {
            self.calculate_visible_tiles(&metrics);
        }
    }

    /// Flush a due recomputation, then drain finished renders
    pub fn poll(&mut self, now: Instant) -> Vec<RenderedTile> {
        if let Some(metrics) = self.scroll_control.poll(now) {
            self.calculate_visible_tiles(&metrics);
        }
        self.poll_tasks(now)
    }

    /// Earliest time at which [`poll`](Self::poll) has something to do
    pub fn next_due(&self) -> Option<Instant> {
        match (self.scroll_control.next_due(), self.tracker.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // ------------------------------------------------------------------
    // Grids
    // ------------------------------------------------------------------

    /// Recompute the grids of every visible page
    ///
    /// Pages that are no longer visible are dropped from the cache. A
    /// visibility entry for a page the document does not have is skipped.
    pub fn calculate_visible_tiles(&mut self, metrics: &ScrollMetrics) {
        if !self.config.enabled {
            return;
        }

        let incoming = self.compute_grids(metrics, None);
        let visible: BTreeSet<u32> = incoming.keys().copied().collect();

        let retained = self.state.retain_pages(&visible);
        let updated = retained.state.update_visible_tiles(incoming, self.config.max_render_attempts);

        let mut removed = retained.removed;
        removed.extend(updated.removed);
        self.apply(Transition { state: updated.state, removed });
    }

    /// Force fresh renders for `pages_to_refresh`
    ///
    /// The pages get new tile ids, so their current tiles are treated like a
    /// zoom: ready ones stay on screen as fallbacks until the new ones are
    /// ready. Pages that are not visible are ignored.
    pub fn recalculate_tiles(&mut self, pages_to_refresh: &[u32], metrics: &ScrollMetrics) {
        if !self.config.enabled || pages_to_refresh.is_empty() {
            return;
        }

        self.refresh_counter += 1;
        for page_index in pages_to_refresh {
            self.refreshed.insert(*page_index, self.refresh_counter);
        }

        let only: BTreeSet<u32> = pages_to_refresh.iter().copied().collect();
        let incoming = self.compute_grids(metrics, Some(&only));
        tracing::debug!(pages = ?only, generation = self.refresh_counter, "refreshing tiles");

        let refreshed = self.state.refresh_pages(incoming);
        self.apply(refreshed);
    }

    fn compute_grids(&self, metrics: &ScrollMetrics, only: Option<&BTreeSet<u32>>) -> BTreeMap<u32, Vec<Tile>> {
        let mut incoming = BTreeMap::new();

        for metric in &metrics.page_visibility_metrics {
            let page_index = metric.page_index();
            if only.is_some_and(|only| !only.contains(&page_index)) {
                continue;
            }
            let Some(page) = self.pages.get(page_index as usize) else {
                tracing::warn!(page = page_index, "visibility reported for a page outside the document");
                continue;
            };

            let mut tiles = calculate_tiles_for_page(page, metric, self.scale, self.rotation, &self.config);
            if let Some(generation) = self.refreshed.get(&page_index) {
                for tile in &mut tiles {
                    tile.id = tile.id.with_refresh(*generation);
                }
            }
            incoming.insert(page_index, tiles);
        }

        incoming
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Issue the render for one queued tile
    pub fn render_tile(&mut self, options: RenderTileOptions, now: Instant) -> Result<RenderTaskHandle, TilingError> {
        let RenderTileOptions { page_index, tile_id, dpr } = options;
        if !self.config.enabled {
            return Err(TilingError::Disabled);
        }
        if self.state.tiles(page_index).is_none() {
            return Err(TilingError::UnknownPage(page_index));
        }

        let key = (page_index, tile_id);
        let Some(tile) = self.state.tile(page_index, &key.1) else {
            return Err(TilingError::UnknownTile { page_index, tile_id: key.1 });
        };
        if self.tracker.contains(&key) || tile.status == TileStatus::Rendering {
            return Err(TilingError::AlreadyRendering { page_index, tile_id: key.1 });
        }
        if tile.status != TileStatus::Queued {
            return Err(TilingError::NotQueued { page_index, tile_id: key.1, status: tile.status });
        }

        let request = RenderRequest { page_index, rect: tile.page_rect, scale_factor: tile.src_scale, dpr };
        let Some(rendering) = self.state.mark_tile_status(page_index, &key.1, TileStatus::Rendering) else {
            return Err(TilingError::NotQueued { page_index, tile_id: key.1, status: tile.status });
        };

        let token = CancellationToken::new();
        let task = self.engine.render_page_rect(request, token.clone());
        let tile_id = key.1.clone();
        if let Err(task) = self.tracker.start(key, task, now) {
            task.abort();
            return Err(TilingError::AlreadyRendering { page_index, tile_id });
        }

        tracing::trace!(page = page_index, tile = %tile_id, "render issued");
        self.commit(rendering);
        Ok(RenderTaskHandle { page_index, tile_id, token })
    }

    /// Issue renders for every queued tile, in page then grid order
    pub fn render_queued_tiles(&mut self, dpr: f64, now: Instant) -> Vec<RenderTaskHandle> {
        let queued: Vec<(u32, TileId)> = self.state.queued().map(|(page, tile)| (page, tile.id.clone())).collect();

        let mut handles = Vec::with_capacity(queued.len());
        for (page_index, tile_id) in queued {
            match self.render_tile(RenderTileOptions { page_index, tile_id, dpr }, now) {
                Ok(handle) => handles.push(handle),
                Err(error) => tracing::debug!(%error, "skipped queued tile"),
            }
        }
        handles
    }

    /// Fold finished renders into the cache
    ///
    /// Successful rasters whose tile is still cached are returned for
    /// painting. Failures, timeouts and aborts mark the tile failed so a later
    /// recomputation can queue it again.
    pub fn poll_tasks(&mut self, now: Instant) -> Vec<RenderedTile> {
        let finished = self.tracker.poll(now);
        if finished.is_empty() {
            return Vec::new();
        }

        let mut state = self.state.clone();
        let mut rendered = Vec::new();

        for done in finished {
            let (page_index, tile_id) = done.key;
            let status = match &done.result {
                Ok(_) => TileStatus::Ready,
                Err(RenderError::Aborted) => {
                    tracing::debug!(page = page_index, tile = %tile_id, "render aborted");
                    TileStatus::Failed
                }
                Err(error) => {
                    tracing::warn!(page = page_index, tile = %tile_id, %error, "tile render failed");
                    TileStatus::Failed
                }
            };

            let screen_rect = state.tile(page_index, &tile_id).map(|tile| tile.screen_rect);
            let Some(next) = state.mark_tile_status(page_index, &tile_id, status) else {
                tracing::trace!(page = page_index, tile = %tile_id, "completion for a tile no longer cached");
                continue;
            };
            state = next;

            if let (Ok(raster), Some(screen_rect)) = (done.result, screen_rect) {
                rendered.push(RenderedTile { page_index, tile_id, screen_rect, raster, elapsed: done.elapsed });
            }
        }

        self.commit(state);
        rendered
    }

    // ------------------------------------------------------------------
    // Subscriptions and queries
    // ------------------------------------------------------------------

    /// Subscribe to published tiling states; the current one is replayed
    pub fn on_tile_rendering(&mut self, handler: impl FnMut(&TilingState) + 'static) -> ListenerId {
        self.tile_events.on(handler)
    }

    /// Remove a tile state subscriber
    pub fn off_tile_rendering(&mut self, id: ListenerId) -> bool {
        self.tile_events.off(id)
    }

    /// Current tile cache
    pub fn state(&self) -> &TilingState {
        &self.state
    }

    /// Scale tiles are computed at
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Rotation tiles are computed for
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Number of renders in flight
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Render counters since the controller was created
    pub fn stats(&self) -> TrackerStats {
        self.tracker.stats()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn apply(&mut self, transition: Transition) {
        self.cancel_removed(&transition.removed);
        self.commit(transition.state);
    }

    fn cancel_removed(&mut self, removed: &[RemovedTile]) {
        for key in removed {
            if self.tracker.cancel(key) {
                tracing::trace!(page = key.0, tile = %key.1, "cancelled render for dropped tile");
            }
        }
    }

    fn commit(&mut self, state: TilingState) {
        if state == self.state {
            return;
        }
        self.state = state;
        self.tile_events.emit(self.state.clone());
    }
}
