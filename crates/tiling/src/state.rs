//! Tile cache and invalidation
//!
//! [`TilingState`] maps page indexes to their tiles. Every action returns a
//! new state together with the tiles that left it, so the caller can cancel
//! their renders; the previous value is never touched.
//!
//! Zoom handling keeps exactly one fallback generation: when a page is
//! recomputed at a new scale its ready tiles stay on screen as fallbacks
//! until every tile of the new generation is ready.

use crate::tile::{Tile, TileId, TileStatus};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A page whose render task should be cancelled, identified by tile
pub type RemovedTile = (u32, TileId);

/// Result of applying an action
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: TilingState,

    /// Non-fallback tiles that are no longer part of the state
    pub removed: Vec<RemovedTile>,
}

/// Visible tiles per page
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TilingState {
    pages: BTreeMap<u32, Vec<Tile>>,
}

impl TilingState {
    /// Creates an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Every tile cached for a page, fallbacks included
    pub fn tiles(&self, page_index: u32) -> Option<&[Tile]> {
        self.pages.get(&page_index).map(Vec::as_slice)
    }

    /// The current-generation tile with `id`
    pub fn tile(&self, page_index: u32, id: &TileId) -> Option<&Tile> {
        self.tiles(page_index)?.iter().find(|tile| !tile.is_fallback && tile.id == *id)
    }

    /// Cached pages in index order
    pub fn pages(&self) -> impl Iterator<Item = (u32, &[Tile])> {
        self.pages.iter().map(|(page, tiles)| (*page, tiles.as_slice()))
    }

    /// Indexes of the cached pages
    pub fn page_indexes(&self) -> BTreeSet<u32> {
        self.pages.keys().copied().collect()
    }

    /// Current-generation tiles waiting for a render
    pub fn queued(&self) -> impl Iterator<Item = (u32, &Tile)> {
        self.pages.iter().flat_map(|(page, tiles)| {
            tiles
                .iter()
                .filter(|tile| !tile.is_fallback && tile.status == TileStatus::Queued)
                .map(move |tile| (*page, tile))
        })
    }

    /// Whether every current-generation tile of a page is ready
    pub fn is_page_ready(&self, page_index: u32) -> bool {
        self.tiles(page_index)
            .is_some_and(|tiles| tiles.iter().filter(|tile| !tile.is_fallback).all(Tile::is_ready))
    }

    /// Total number of cached tiles
    pub fn tile_count(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    /// True when no page has tiles
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Replace the visible tiles of the pages in `incoming`
    ///
    /// Pages not mentioned are left alone; an empty list removes its page.
    /// At an unchanged scale, tiles already known keep their status so
    /// nothing in flight restarts, and failed tiles are re-queued while
    /// they have attempts left. At a new scale, ready tiles become the
    /// page's fallback generation.
    pub fn update_visible_tiles(&self, incoming: BTreeMap<u32, Vec<Tile>>, max_attempts: u32) -> Transition {
        self.replace_pages(incoming, |page_index, fallbacks, current, new_tiles| {
            let rescaled = match (current.first(), new_tiles.first()) {
                (Some(cached), Some(first)) => cached.src_scale != first.src_scale,
                _ => false,
            };
            if rescaled {
                tracing::debug!(page = page_index, "scale changed, promoting ready tiles to fallback");
                promote(fallbacks, current, new_tiles)
            } else {
                merge(fallbacks, current, new_tiles, max_attempts)
            }
        })
    }

    /// Start a new tile generation for the pages in `incoming`
    ///
    /// Used when page content changed at an unchanged scale: ready tiles are
    /// kept as fallbacks exactly as on a zoom, and every incoming tile is
    /// queued.
    pub fn refresh_pages(&self, incoming: BTreeMap<u32, Vec<Tile>>) -> Transition {
        self.replace_pages(incoming, |page_index, fallbacks, current, new_tiles| {
            tracing::debug!(page = page_index, "refreshing page tiles");
            promote(fallbacks, current, new_tiles)
        })
    }

    fn replace_pages(
        &self,
        incoming: BTreeMap<u32, Vec<Tile>>,
        mut combine: impl FnMut(u32, Vec<Tile>, Vec<Tile>, Vec<Tile>) -> Vec<Tile>,
    ) -> Transition {
        let mut pages = self.pages.clone();

        for (page_index, new_tiles) in incoming {
            let previous = pages.remove(&page_index).unwrap_or_default();
            if new_tiles.is_empty() {
                tracing::debug!(page = page_index, "page has no visible tiles");
                continue;
            }

            let (fallbacks, current): (Vec<Tile>, Vec<Tile>) =
                previous.into_iter().partition(|tile| tile.is_fallback);
            pages.insert(page_index, combine(page_index, fallbacks, current, new_tiles));
        }

        let mut removed = Vec::new();
        collect_removed(&self.pages, &pages, &mut removed);
        Transition { state: TilingState { pages }, removed }
    }

    /// Drop every page not in `keep`
    pub fn retain_pages(&self, keep: &BTreeSet<u32>) -> Transition {
        let mut pages = self.pages.clone();
        pages.retain(|page, _| keep.contains(page));

        let mut removed = Vec::new();
        collect_removed(&self.pages, &pages, &mut removed);
        Transition { state: TilingState { pages }, removed }
    }

    /// Record a render transition for one tile
    ///
    /// Returns `None` when the tile is unknown (or a fallback) or when the
    /// transition would move its status backwards. A tile that fails gains
    /// an attempt. Once every current tile of the page is ready the fallback
    /// generation is dropped.
    pub fn mark_tile_status(&self, page_index: u32, id: &TileId, status: TileStatus) -> Option<TilingState> {
        let tiles = self.pages.get(&page_index)?;
        let position = tiles.iter().position(|tile| !tile.is_fallback && tile.id == *id)?;

        let from = tiles[position].status;
        if !from.can_transition_to(status) {
            tracing::trace!(page = page_index, tile = %id, %from, to = %status, "ignored status regression");
            return None;
        }

        let mut tiles = tiles.clone();
        tiles[position].status = status;
        if status == TileStatus::Failed {
            tiles[position].attempts += 1;
        }

        if status == TileStatus::Ready && tiles.iter().filter(|tile| !tile.is_fallback).all(Tile::is_ready) {
            tiles.retain(|tile| !tile.is_fallback);
        }

        let mut pages = self.pages.clone();
        pages.insert(page_index, tiles);
        Some(TilingState { pages })
    }

    /// Empty state, as published while tiling is disabled
    pub fn clear(&self) -> Transition {
        self.retain_pages(&BTreeSet::new())
    }
}

/// New generation: ready tiles become the only fallback generation
fn promote(fallbacks: Vec<Tile>, current: Vec<Tile>, new_tiles: Vec<Tile>) -> Vec<Tile> {
    let promoted: Vec<Tile> = current
        .into_iter()
        .filter(Tile::is_ready)
        .map(|tile| Tile { is_fallback: true, ..tile })
        .collect();

    let mut merged = if promoted.is_empty() { fallbacks } else { promoted };
    merged.extend(new_tiles.into_iter().map(fresh));
    merged
}

/// Same scale: keep known tiles as they are, queue the rest
fn merge(fallbacks: Vec<Tile>, current: Vec<Tile>, new_tiles: Vec<Tile>, max_attempts: u32) -> Vec<Tile> {
    let mut known: HashMap<TileId, Tile> = current.into_iter().map(|tile| (tile.id.clone(), tile)).collect();

    let mut merged = fallbacks;
    merged.extend(new_tiles.into_iter().map(|tile| match known.remove(&tile.id) {
        Some(existing) if existing.status == TileStatus::Failed && existing.attempts < max_attempts => {
            Tile { status: TileStatus::Queued, ..existing }
        }
        Some(existing) => existing,
        None => fresh(tile),
    }));
    merged
}

fn fresh(tile: Tile) -> Tile {
    Tile { status: TileStatus::Queued, is_fallback: false, attempts: 0, ..tile }
}

/// Current-generation tiles of `before` that `after` no longer has
fn collect_removed(before: &BTreeMap<u32, Vec<Tile>>, after: &BTreeMap<u32, Vec<Tile>>, removed: &mut Vec<RemovedTile>) {
    for (page_index, tiles) in before {
        let kept: BTreeSet<&TileId> = after
            .get(page_index)
            .map(|tiles| tiles.iter().filter(|tile| !tile.is_fallback).map(|tile| &tile.id).collect())
            .unwrap_or_default();

        removed.extend(
            tiles
                .iter()
                .filter(|tile| !tile.is_fallback && !kept.contains(&tile.id))
                .map(|tile| (*page_index, tile.id.clone())),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageflow_core::Rect;
    use proptest::prelude::*;

    const MAX_ATTEMPTS: u32 = 3;

    fn tile(page: u32, col: u32, scale: f64) -> Tile {
        let screen = Rect::new(col as f64 * 100.0, 0.0, 100.0, 100.0);
        Tile::queued(TileId::new(page, scale, &screen), col, 0, screen, screen.scale(1.0 / scale), scale)
    }

    fn grid(page: u32, cols: std::ops::Range<u32>, scale: f64) -> BTreeMap<u32, Vec<Tile>> {
        BTreeMap::from([(page, cols.map(|col| tile(page, col, scale)).collect())])
    }

    fn statuses(state: &TilingState, page: u32) -> Vec<(u32, TileStatus, bool)> {
        state.tiles(page).unwrap().iter().map(|t| (t.col, t.status, t.is_fallback)).collect()
    }

    fn mark(state: TilingState, page: u32, id: &TileId, status: TileStatus) -> TilingState {
        state.mark_tile_status(page, id, status).unwrap()
    }

    fn all_ready(mut state: TilingState, page: u32) -> TilingState {
        let ids: Vec<TileId> = state.tiles(page).unwrap().iter().filter(|t| !t.is_fallback).map(|t| t.id.clone()).collect();
        for id in ids {
            state = mark(state, page, &id, TileStatus::Rendering);
            state = mark(state, page, &id, TileStatus::Ready);
        }
        state
    }

    #[test]
    fn test_new_tiles_start_queued() {
        let transition = TilingState::new().update_visible_tiles(grid(0, 0..3, 1.0), MAX_ATTEMPTS);

        assert!(transition.removed.is_empty());
        assert_eq!(transition.state.queued().count(), 3);
        assert_eq!(transition.state.tile_count(), 3);
    }

    #[test]
    fn test_same_scale_recompute_preserves_status() {
        let state = TilingState::new().update_visible_tiles(grid(0, 0..3, 1.0), MAX_ATTEMPTS).state;
        let first = state.tiles(0).unwrap()[0].id.clone();
        let second = state.tiles(0).unwrap()[1].id.clone();
        let state = mark(state, 0, &first, TileStatus::Rendering);
        let state = mark(mark(state, 0, &second, TileStatus::Rendering), 0, &second, TileStatus::Ready);

        // scroll right by one column: col 0 leaves, col 3 arrives
        let transition = state.update_visible_tiles(grid(0, 1..4, 1.0), MAX_ATTEMPTS);
        assert_eq!(
            statuses(&transition.state, 0),
            vec![(1, TileStatus::Ready, false), (2, TileStatus::Queued, false), (3, TileStatus::Queued, false)]
        );
        assert_eq!(transition.removed, vec![(0, first)]);
    }

    #[test]
    fn test_scale_change_promotes_ready_tiles_to_fallback() {
        let state = TilingState::new().update_visible_tiles(grid(0, 0..2, 1.0), MAX_ATTEMPTS).state;
        let ready = state.tiles(0).unwrap()[0].id.clone();
        let state = mark(mark(state, 0, &ready, TileStatus::Rendering), 0, &ready, TileStatus::Ready);

        let transition = state.update_visible_tiles(grid(0, 0..3, 2.0), MAX_ATTEMPTS);
        assert_eq!(
            statuses(&transition.state, 0),
            vec![
                (0, TileStatus::Ready, true),
                (0, TileStatus::Queued, false),
                (1, TileStatus::Queued, false),
                (2, TileStatus::Queued, false),
            ]
        );
        // both old-scale tiles leave the current generation
        assert_eq!(transition.removed.len(), 2);
        assert!(transition.removed.iter().any(|(_, id)| *id == ready));
    }

    #[test]
    fn test_only_one_fallback_generation_is_kept() {
        let state = TilingState::new().update_visible_tiles(grid(0, 0..2, 1.0), MAX_ATTEMPTS).state;
        let state = all_ready(state, 0);

        let state = state.update_visible_tiles(grid(0, 0..2, 2.0), MAX_ATTEMPTS).state;
        let half_ready = state.tiles(0).unwrap().iter().find(|t| !t.is_fallback).unwrap().id.clone();
        let state = mark(mark(state, 0, &half_ready, TileStatus::Rendering), 0, &half_ready, TileStatus::Ready);

        let state = state.update_visible_tiles(grid(0, 0..2, 3.0), MAX_ATTEMPTS).state;
        let fallback_scales: Vec<f64> =
            state.tiles(0).unwrap().iter().filter(|t| t.is_fallback).map(|t| t.src_scale).collect();
        assert_eq!(fallback_scales, vec![2.0]);
    }

    #[test]
    fn test_scale_change_without_ready_tiles_keeps_older_fallbacks() {
        let state = TilingState::new().update_visible_tiles(grid(0, 0..1, 1.0), MAX_ATTEMPTS).state;
        let state = all_ready(state, 0);
        let state = state.update_visible_tiles(grid(0, 0..1, 2.0), MAX_ATTEMPTS).state;

        // nothing at 2x finished before zooming again
        let state = state.update_visible_tiles(grid(0, 0..1, 3.0), MAX_ATTEMPTS).state;
        assert_eq!(statuses(&state, 0), vec![(0, TileStatus::Ready, true), (0, TileStatus::Queued, false)]);
        assert_eq!(state.tiles(0).unwrap()[0].src_scale, 1.0);
    }

    #[test]
    fn test_fallbacks_drop_once_new_generation_is_ready() {
        let state = TilingState::new().update_visible_tiles(grid(0, 0..2, 1.0), MAX_ATTEMPTS).state;
        let state = all_ready(state, 0);
        let state = state.update_visible_tiles(grid(0, 0..2, 2.0), MAX_ATTEMPTS).state;

        let ids: Vec<TileId> = state.tiles(0).unwrap().iter().filter(|t| !t.is_fallback).map(|t| t.id.clone()).collect();
        let state = mark(mark(state, 0, &ids[0], TileStatus::Rendering), 0, &ids[0], TileStatus::Ready);
        assert_eq!(state.tiles(0).unwrap().iter().filter(|t| t.is_fallback).count(), 2);

        let state = mark(mark(state, 0, &ids[1], TileStatus::Rendering), 0, &ids[1], TileStatus::Ready);
        assert!(state.tiles(0).unwrap().iter().all(|t| !t.is_fallback));
        assert!(state.is_page_ready(0));
    }

    #[test]
    fn test_refresh_starts_a_generation_at_the_same_scale() {
        let state = TilingState::new().update_visible_tiles(grid(0, 0..2, 1.0), MAX_ATTEMPTS).state;
        let state = all_ready(state, 0);

        let refreshed: Vec<Tile> = grid(0, 0..2, 1.0)
            .remove(&0)
            .unwrap()
            .into_iter()
            .map(|tile| Tile { id: tile.id.with_refresh(1), ..tile })
            .collect();
        let transition = state.refresh_pages(BTreeMap::from([(0, refreshed)]));

        assert_eq!(
            statuses(&transition.state, 0),
            vec![
                (0, TileStatus::Ready, true),
                (1, TileStatus::Ready, true),
                (0, TileStatus::Queued, false),
                (1, TileStatus::Queued, false),
            ]
        );
        assert_eq!(transition.removed.len(), 2);
    }

    #[test]
    fn test_status_updates_never_regress() {
        let state = TilingState::new().update_visible_tiles(grid(0, 0..1, 1.0), MAX_ATTEMPTS).state;
        let id = state.tiles(0).unwrap()[0].id.clone();
        let state = all_ready(state, 0);

        assert!(state.mark_tile_status(0, &id, TileStatus::Rendering).is_none());
        assert!(state.mark_tile_status(0, &id, TileStatus::Queued).is_none());
        assert!(state.mark_tile_status(0, &TileId::from("missing"), TileStatus::Ready).is_none());
        assert!(state.mark_tile_status(9, &id, TileStatus::Ready).is_none());
    }

    #[test]
    fn test_failed_tiles_are_requeued_until_attempts_run_out() {
        let mut state = TilingState::new().update_visible_tiles(grid(0, 0..1, 1.0), MAX_ATTEMPTS).state;
        let id = state.tiles(0).unwrap()[0].id.clone();

        for attempt in 1..=MAX_ATTEMPTS {
            state = mark(mark(state, 0, &id, TileStatus::Rendering), 0, &id, TileStatus::Failed);
            assert_eq!(state.tile(0, &id).unwrap().attempts, attempt);
            state = state.update_visible_tiles(grid(0, 0..1, 1.0), MAX_ATTEMPTS).state;
        }

        assert_eq!(state.tile(0, &id).unwrap().status, TileStatus::Failed);
        assert_eq!(state.queued().count(), 0);
    }

    #[test]
    fn test_failed_tiles_keep_fallbacks_on_screen() {
        let state = TilingState::new().update_visible_tiles(grid(0, 0..1, 1.0), MAX_ATTEMPTS).state;
        let state = all_ready(state, 0);
        let state = state.update_visible_tiles(grid(0, 0..1, 2.0), MAX_ATTEMPTS).state;
        let id = state.tiles(0).unwrap().iter().find(|t| !t.is_fallback).unwrap().id.clone();

        let state = mark(mark(state, 0, &id, TileStatus::Rendering), 0, &id, TileStatus::Failed);
        assert_eq!(state.tiles(0).unwrap().iter().filter(|t| t.is_fallback).count(), 1);
    }

    #[test]
    fn test_empty_incoming_list_removes_the_page() {
        let state = TilingState::new().update_visible_tiles(grid(0, 0..2, 1.0), MAX_ATTEMPTS).state;
        let transition = state.update_visible_tiles(BTreeMap::from([(0, Vec::new())]), MAX_ATTEMPTS);

        assert!(transition.state.is_empty());
        assert_eq!(transition.removed.len(), 2);
    }

    #[test]
    fn test_retain_and_clear_report_removed_tiles() {
        let mut incoming = grid(0, 0..2, 1.0);
        incoming.extend(grid(1, 0..1, 1.0));
        let state = TilingState::new().update_visible_tiles(incoming, MAX_ATTEMPTS).state;

        let transition = state.retain_pages(&BTreeSet::from([1]));
        assert_eq!(transition.state.page_indexes(), BTreeSet::from([1]));
        assert_eq!(transition.removed.len(), 2);

        let cleared = transition.state.clear();
        assert!(cleared.state.is_empty());
        assert_eq!(cleared.removed, vec![(1, tile(1, 0, 1.0).id)]);
    }

    #[test]
    fn test_previous_state_is_untouched() {
        let before = TilingState::new().update_visible_tiles(grid(0, 0..2, 1.0), MAX_ATTEMPTS).state;
        let snapshot = before.clone();
        let _ = before.update_visible_tiles(grid(0, 0..2, 2.0), MAX_ATTEMPTS);
        let _ = before.retain_pages(&BTreeSet::new());
        assert_eq!(before, snapshot);
    }

    proptest! {
        #[test]
        fn test_constant_scale_recompute_keeps_statuses(
            first in 0u32..6,
            len in 1u32..6,
            grow_before in 0u32..3,
            grow_after in 0u32..3,
            progress in prop::collection::vec(0u8..3, 6),
        ) {
            let state = TilingState::new().update_visible_tiles(grid(0, first..first + len, 1.0), MAX_ATTEMPTS).state;

            let mut state = state;
            for (tile, step) in state.clone().tiles(0).unwrap().iter().zip(&progress) {
                if *step >= 1 {
                    state = mark(state, 0, &tile.id, TileStatus::Rendering);
                }
                if *step >= 2 {
                    state = mark(state, 0, &tile.id, TileStatus::Ready);
                }
            }

            let before = state.clone();
            let superset = grid(0, first.saturating_sub(grow_before)..first + len + grow_after, 1.0);
            let after = state.update_visible_tiles(superset, MAX_ATTEMPTS);

            prop_assert!(after.removed.is_empty());
            for tile in before.tiles(0).unwrap() {
                let kept = after.state.tile(0, &tile.id).unwrap();
                prop_assert_eq!(kept.status, tile.status);
            }
        }

        #[test]
        fn test_zoom_promotion_converges(cols in 1u32..6, new_cols in 1u32..6) {
            let state = TilingState::new().update_visible_tiles(grid(0, 0..cols, 1.0), MAX_ATTEMPTS).state;
            let state = all_ready(state, 0);

            let zoomed = state.update_visible_tiles(grid(0, 0..new_cols, 2.0), MAX_ATTEMPTS).state;
            let tiles = zoomed.tiles(0).unwrap();
            prop_assert_eq!(tiles.iter().filter(|t| t.is_fallback).count(), cols as usize);
            prop_assert!(tiles.iter().filter(|t| t.is_fallback).all(|t| t.src_scale == 1.0 && t.is_ready()));
            prop_assert!(tiles.iter().filter(|t| !t.is_fallback).all(|t| t.status == TileStatus::Queued));

            let done = all_ready(zoomed, 0);
            prop_assert!(done.tiles(0).unwrap().iter().all(|t| !t.is_fallback));
        }
    }
}
