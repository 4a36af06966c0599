//! Tile grid for one page
//!
//! Works in screen pixels. Neighbouring tiles are `tile_size - overlap_px`
//! apart so they overlap by `overlap_px`, which hides seams from sub-pixel
//! rounding in the paint surface. Edge tiles are clipped to the page.

use crate::tile::{Tile, TileId};
use pageflow_core::{restore_rect, transform_size, PageObject, Rect, Rotation, TilingConfig};
use pageflow_scroll::VisibilityMetric;
use std::ops::RangeInclusive;

/// Tiles covering the visible part of `page`, plus `extra_rings` around it
///
/// `metric.scaled` is the visible rect in displayed (rotated) page pixels.
/// It is mapped back into the page's intrinsic orientation before tiling, so
/// the grid always follows the page's own pixel grid.
pub fn calculate_tiles_for_page(
    page: &PageObject,
    metric: &VisibilityMetric,
    scale: f64,
    rotation: Rotation,
    config: &TilingConfig,
) -> Vec<Tile> {
    let page_w = page.size.width * scale;
    let page_h = page.size.height * scale;
    let step = config.step();
    if !(step > 0.0 && step.is_finite()) {
        tracing::warn!(tile_size = config.tile_size, overlap = config.overlap_px, "tile step is not positive, no tiles");
        return Vec::new();
    }

    let container = transform_size(page.size, rotation, scale);
    let displayed = metric.scaled.to_rect();
    let visible = restore_rect(container, displayed, rotation, 1.0);

    let rings = i64::from(config.extra_rings);
    let tile_size = config.tile_size;
    let Some(cols) = tile_span(visible.left(), visible.right(), page_w, step, tile_size, rings) else {
        return Vec::new();
    };
    let Some(rows) = tile_span(visible.top(), visible.bottom(), page_h, step, tile_size, rings) else {
        return Vec::new();
    };

    let mut tiles = Vec::with_capacity(cols.clone().count() * rows.clone().count());
    for col in cols {
        let x = col as f64 * step;
        let w = config.tile_size.min(page_w - x);

        for row in rows.clone() {
            let y = row as f64 * step;
            let h = config.tile_size.min(page_h - y);
            let screen_rect = Rect::new(x, y, w, h);

            tiles.push(Tile::queued(
                TileId::new(page.index, scale, &screen_rect),
                col as u32,
                row as u32,
                screen_rect,
                screen_rect.scale(1.0 / scale),
                scale,
            ));
        }
    }

    tracing::trace!(page = page.index, scale, tiles = tiles.len(), "calculated tile grid");
    tiles
}

/// Inclusive tile index range along one axis
///
/// The visible span `[start, end)` is in pixels; indexes are clamped to the
/// tiles that exist on a page `page_px` pixels long.
fn tile_span(start: f64, end: f64, page_px: f64, step: f64, tile_size: f64, rings: i64) -> Option<RangeInclusive<i64>> {
    if page_px <= 0.0 || end <= start {
        return None;
    }

    let max_index = last_index(page_px, step, tile_size).max(0);
    let first = (start / step).floor() as i64;
    // a sliver narrower than one pixel still needs the tile it starts in
    let last = last_index(end, step, tile_size).max(first);

    let from = (first - rings).max(0);
    let to = (last + rings).min(max_index);
    (from <= to).then_some(from..=to)
}

/// Index of the tile that reaches `end`
///
/// `floor((end - 1) / step)` is enough while the overlap is at least a
/// pixel. Below that the tile it picks can stop short of `end`, so the first
/// tile whose far edge reaches `end` wins.
fn last_index(end: f64, step: f64, tile_size: f64) -> i64 {
    let by_pixel = ((end - 1.0) / step).floor() as i64;
    let by_reach = ((end - tile_size) / step).ceil() as i64;
    by_pixel.max(by_reach)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageflow_scroll::VisibleRect;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn metric(page_x: f64, page_y: f64, width: f64, height: f64, scale: f64) -> VisibilityMetric {
        let scaled = VisibleRect { page_x, page_y, visible_width: width, visible_height: height, scale };
        let original = VisibleRect {
            page_x: page_x / scale,
            page_y: page_y / scale,
            visible_width: width / scale,
            visible_height: height / scale,
            scale: 1.0,
        };
        VisibilityMetric { page_number: 1, viewport_x: 0.0, viewport_y: 0.0, visible_percentage: 100.0, original, scaled }
    }

    fn page() -> PageObject {
        PageObject::new(0, 600.0, 800.0)
    }

    #[test]
    fn test_page_that_fits_one_tile_yields_a_single_tile() {
        let config = TilingConfig::default().with_tile_size(1024.0);
        let tiles = calculate_tiles_for_page(&page(), &metric(0.0, 0.0, 600.0, 800.0, 1.0), 1.0, Rotation::Degree0, &config);

        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].page_rect, Rect::new(0.0, 0.0, 600.0, 800.0));
        assert_eq!(tiles[0].screen_rect, Rect::new(0.0, 0.0, 600.0, 800.0));
    }

    #[test]
    fn test_default_tiles_at_unit_scale() {
        let config = TilingConfig::default();
        let tiles = calculate_tiles_for_page(&page(), &metric(0.0, 0.0, 600.0, 800.0, 1.0), 1.0, Rotation::Degree0, &config);

        // one column; 800px is taller than a 768px tile, so a 34.5px row follows
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0].page_rect, Rect::new(0.0, 0.0, 600.0, 768.0));
        assert_eq!(tiles[1].page_rect, Rect::new(0.0, 765.5, 600.0, 34.5));
    }

    #[test]
    fn test_double_scale_yields_six_tiles() {
        let config = TilingConfig::default();
        let tiles = calculate_tiles_for_page(&page(), &metric(0.0, 0.0, 1200.0, 1600.0, 2.0), 2.0, Rotation::Degree0, &config);

        assert_eq!(config.step(), 765.5);
        assert_eq!(tiles.len(), 6);

        let cols: Vec<u32> = tiles.iter().map(|tile| tile.col).collect();
        let rows: Vec<u32> = tiles.iter().map(|tile| tile.row).collect();
        assert_eq!(cols, vec![0, 0, 0, 1, 1, 1]);
        assert_eq!(rows, vec![0, 1, 2, 0, 1, 2]);

        let last = &tiles[5];
        assert_eq!(last.screen_rect, Rect::new(765.5, 1531.0, 434.5, 69.0));
        assert_eq!(last.page_rect, Rect::new(382.75, 765.5, 217.25, 34.5));
        assert_eq!(last.src_scale, 2.0);
        assert!(tiles.iter().all(|tile| !tile.is_fallback));
    }

    #[test]
    fn test_ids_encode_page_scale_and_screen_rect() {
        let config = TilingConfig::default();
        let visible = metric(0.0, 0.0, 1200.0, 1600.0, 2.0);
        let tiles = calculate_tiles_for_page(&page(), &visible, 2.0, Rotation::Degree0, &config);

        assert_eq!(tiles[0].id.as_str(), "p0-2-x0-y0-w768-h768");
        assert_eq!(tiles[3].id.as_str(), "p0-2-x765.5-y0-w434.5-h768");

        let again = calculate_tiles_for_page(&page(), &visible, 2.0, Rotation::Degree0, &config);
        assert_eq!(tiles, again);
    }

    #[test]
    fn test_partial_visibility_and_extra_rings() {
        let visible = metric(800.0, 0.0, 300.0, 500.0, 2.0);

        let tiles = calculate_tiles_for_page(&page(), &visible, 2.0, Rotation::Degree0, &TilingConfig::default());
        assert_eq!(tiles.len(), 1);
        assert_eq!((tiles[0].col, tiles[0].row), (1, 0));

        let ringed = TilingConfig::default().with_extra_rings(1);
        let tiles = calculate_tiles_for_page(&page(), &visible, 2.0, Rotation::Degree0, &ringed);
        let cells: Vec<(u32, u32)> = tiles.iter().map(|tile| (tile.col, tile.row)).collect();
        assert_eq!(cells, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn test_rotated_visibility_is_mapped_back_to_page_pixels() {
        // displayed 800x600; its top-left strip is the bottom-left of the page
        let visible = metric(0.0, 0.0, 100.0, 50.0, 1.0);
        let tiles = calculate_tiles_for_page(&page(), &visible, 1.0, Rotation::Degree90, &TilingConfig::default());

        let cells: Vec<(u32, u32)> = tiles.iter().map(|tile| (tile.col, tile.row)).collect();
        assert_eq!(cells, vec![(0, 0), (0, 1)]);
    }

    #[test]
    fn test_empty_visible_rect_yields_no_tiles() {
        let tiles = calculate_tiles_for_page(&page(), &metric(10.0, 10.0, 0.0, 50.0, 1.0), 1.0, Rotation::Degree0, &TilingConfig::default());
        assert!(tiles.is_empty());
    }

    #[test]
    fn test_step_of_zero_yields_no_tiles() {
        // validate() rejects both; the calculator just yields nothing
        let config = TilingConfig::default().with_overlap(768.0);
        let tiles = calculate_tiles_for_page(&page(), &metric(0.0, 0.0, 600.0, 800.0, 1.0), 1.0, Rotation::Degree0, &config);
        assert!(tiles.is_empty());

        let config = TilingConfig::default().with_tile_size(100.0).with_overlap(150.0);
        let tiles = calculate_tiles_for_page(&page(), &metric(0.0, 0.0, 600.0, 800.0, 1.0), 1.0, Rotation::Degree0, &config);
        assert!(tiles.is_empty());
    }

    #[test]
    fn test_sub_pixel_overlap_still_reaches_the_visible_edge() {
        let config = TilingConfig::default().with_tile_size(100.0).with_overlap(0.5);
        let tiles = calculate_tiles_for_page(&page(), &metric(0.0, 0.0, 199.99, 50.0, 1.0), 1.0, Rotation::Degree0, &config);

        let right = tiles.iter().map(|tile| tile.screen_rect.right()).fold(f64::NEG_INFINITY, f64::max);
        let cols: Vec<u32> = tiles.iter().map(|tile| tile.col).collect();
        assert_eq!(cols, vec![0, 1, 2]);
        assert!(right >= 199.99);
    }

    #[test]
    fn test_sub_pixel_overlap_reaches_the_page_edge() {
        // 199.8px wide: floor(198.8 / 99.5) stops at column 1, which ends at 199.5
        let page = PageObject::new(0, 199.8, 100.0);
        let config = TilingConfig::default().with_tile_size(100.0).with_overlap(0.5);
        let tiles = calculate_tiles_for_page(&page, &metric(150.0, 0.0, 49.8, 100.0, 1.0), 1.0, Rotation::Degree0, &config);

        let last = tiles.last().unwrap();
        assert_eq!(last.col, 2);
        assert_eq!(last.screen_rect, Rect::new(199.0, 0.0, 199.8 - 199.0, 100.0));
    }

    proptest! {
        #[test]
        fn test_tiles_cover_the_visible_rect(
            width in 50.0f64..2000.0,
            height in 50.0f64..2000.0,
            scale in 0.25f64..4.0,
            fx in 0.0f64..1.0,
            fy in 0.0f64..1.0,
            fw in 0.0f64..1.0,
            fh in 0.0f64..1.0,
            tile_size in 256.0f64..1024.0,
            overlap in 0.01f64..16.0,
            turns in 0u32..4,
        ) {
            let page = PageObject::new(3, width, height);
            let rotation = Rotation::from_quarter_turns(turns);
            let config = TilingConfig::default().with_tile_size(tile_size).with_overlap(overlap);
            let displayed = transform_size(page.size, rotation, scale);

            let x = fx * (displayed.width - 1.0);
            let y = fy * (displayed.height - 1.0);
            let w = 1.0 + fw * (displayed.width - x - 1.0);
            let h = 1.0 + fh * (displayed.height - y - 1.0);
            let tiles = calculate_tiles_for_page(&page, &metric(x, y, w, h, scale), scale, rotation, &config);

            let visible = restore_rect(displayed, Rect::new(x, y, w, h), rotation, 1.0);
            let left = tiles.iter().map(|t| t.screen_rect.left()).fold(f64::INFINITY, f64::min);
            let top = tiles.iter().map(|t| t.screen_rect.top()).fold(f64::INFINITY, f64::min);
            let right = tiles.iter().map(|t| t.screen_rect.right()).fold(f64::NEG_INFINITY, f64::max);
            let bottom = tiles.iter().map(|t| t.screen_rect.bottom()).fold(f64::NEG_INFINITY, f64::max);

            prop_assert!(!tiles.is_empty());
            prop_assert!(left <= visible.left() + 1e-6);
            prop_assert!(top <= visible.top() + 1e-6);
            prop_assert!(right >= visible.right() - 1e-6);
            prop_assert!(bottom >= visible.bottom() - 1e-6);

            let cells: HashMap<(u32, u32), &Tile> = tiles.iter().map(|t| ((t.col, t.row), t)).collect();
            for tile in &tiles {
                prop_assert!(tile.screen_rect.right() <= width * scale + 1e-6);
                prop_assert!(tile.screen_rect.bottom() <= height * scale + 1e-6);

                // the next column over starts exactly `overlap` before this one ends
                if let Some(next) = cells.get(&(tile.col + 1, tile.row)) {
                    let shared = tile.screen_rect.right() - next.screen_rect.left();
                    prop_assert!(shared > 0.0);
                    if tile.screen_rect.size.width == tile_size {
                        prop_assert!((shared - overlap).abs() < 1e-6);
                    }
                }
            }
        }
    }
}
