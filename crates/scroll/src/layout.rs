//! Virtual item layout
//!
//! Flattens the document's spreads into an ordered list of virtual items,
//! one per spread, positioned along the scroll axis. Geometry is stored in
//! unscaled page space; the current scale is applied by readers.

use pageflow_core::{Point, Rect, RotatedPage, ScrollAxis, Size};
use serde::Serialize;

/// Placement of one page inside its virtual item
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageLayout {
    /// 1-based page number
    pub page_number: u32,

    /// 0-based page index
    pub page_index: u32,

    /// Offset from the item's origin (unscaled)
    pub x: f64,
    pub y: f64,

    /// Unrotated page size (unscaled)
    pub width: f64,
    pub height: f64,

    /// Page size with the document rotation applied (unscaled)
    pub rotated_width: f64,
    pub rotated_height: f64,
}

impl PageLayout {
    /// Unrotated page size
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Page size after rotation, as laid out
    pub fn rotated_size(&self) -> Size {
        Size::new(self.rotated_width, self.rotated_height)
    }
}

/// One scroll-axis unit of layout (a spread of one or more pages)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirtualItem {
    pub id: String,

    /// Position in the item list
    pub index: usize,

    /// Start of the item along the scroll axis (unscaled)
    pub offset: f64,

    /// Extent along the scroll axis (unscaled)
    pub main_axis_size: f64,

    /// Extent across the scroll axis (unscaled)
    pub cross_axis_size: f64,

    pub page_layouts: Vec<PageLayout>,
    pub page_numbers: Vec<u32>,
}

impl VirtualItem {
    /// End of the item along the scroll axis (unscaled)
    pub fn end(&self) -> f64 {
        self.offset + self.main_axis_size
    }

    /// Top-left corner of the item in content space
    pub fn origin(&self, axis: ScrollAxis) -> Point {
        axis.point(self.offset, 0.0)
    }

    /// Item size in x/y terms for `axis`
    pub fn size(&self, axis: ScrollAxis) -> Size {
        axis.size(self.main_axis_size, self.cross_axis_size)
    }

    /// Item rect in unscaled content coordinates
    pub fn rect(&self, axis: ScrollAxis) -> Rect {
        Rect { origin: self.origin(axis), size: self.size(axis) }
    }

    /// Whether the item holds `page_number`
    pub fn contains_page(&self, page_number: u32) -> bool {
        self.page_numbers.contains(&page_number)
    }

    /// Layout of `page_number` inside the item, if it holds that page
    pub fn page_layout(&self, page_number: u32) -> Option<&PageLayout> {
        self.page_layouts.iter().find(|layout| layout.page_number == page_number)
    }
}

/// Lay out spreads along `axis`
///
/// Pages inside a spread sit side by side starting at x = 0, separated by
/// `page_gap`. A spread is as wide as its pages plus the gaps between them
/// and as tall as its tallest page; which of the two is the main-axis size
/// depends on `axis`. Consecutive items are separated by `page_gap`.
pub fn create_virtual_items(spreads: &[Vec<RotatedPage>], page_gap: f64, axis: ScrollAxis) -> Vec<VirtualItem> {
    let mut items = Vec::with_capacity(spreads.len());
    let mut offset = 0.0;

    for spread in spreads {
        if spread.is_empty() {
            tracing::debug!(index = items.len(), "skipping empty spread");
            continue;
        }

        let mut page_x = 0.0;
        let mut height: f64 = 0.0;
        let mut page_layouts = Vec::with_capacity(spread.len());

        for rotated in spread {
            let page = &rotated.page;
            page_layouts.push(PageLayout {
                page_number: page.number(),
                page_index: page.index,
                x: page_x,
                y: 0.0,
                width: page.size.width,
                height: page.size.height,
                rotated_width: rotated.rotated_size.width,
                rotated_height: rotated.rotated_size.height,
            });
            page_x += rotated.rotated_size.width + page_gap;
            height = height.max(rotated.rotated_size.height);
        }

        // page_x carries one trailing gap
        let width = page_x - page_gap;
        let spread_size = Size::new(width, height);
        let main_axis_size = axis.main_size(spread_size);
        let index = items.len();

        items.push(VirtualItem {
            id: format!("item-{index}"),
            index,
            offset,
            main_axis_size,
            cross_axis_size: axis.cross_size(spread_size),
            page_numbers: page_layouts.iter().map(|layout| layout.page_number).collect(),
            page_layouts,
        });

        offset += main_axis_size + page_gap;
    }

    items
}

/// Unscaled size of the whole laid-out document
pub fn total_content_size(items: &[VirtualItem], axis: ScrollAxis) -> Size {
    let main = items.last().map_or(0.0, VirtualItem::end);
    let cross = items.iter().map(|item| item.cross_axis_size).fold(0.0, f64::max);
    axis.size(main, cross)
}

/// Virtual items together with the axis and content size they were built for
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentLayout {
    pub axis: ScrollAxis,
    pub page_gap: f64,
    pub virtual_items: Vec<VirtualItem>,
    pub total_content_size: Size,
}

impl DocumentLayout {
    /// Lay out rotated spreads along `axis`
    pub fn build(spreads: &[Vec<RotatedPage>], page_gap: f64, axis: ScrollAxis) -> Self {
        let virtual_items = create_virtual_items(spreads, page_gap, axis);
        let total_content_size = total_content_size(&virtual_items, axis);
        Self { axis, page_gap, virtual_items, total_content_size }
    }

    /// Layout with no items
    pub fn empty(axis: ScrollAxis, page_gap: f64) -> Self {
        Self { axis, page_gap, virtual_items: Vec::new(), total_content_size: Size::default() }
    }

    /// True when the document has no pages
    pub fn is_empty(&self) -> bool {
        self.virtual_items.is_empty()
    }

    /// Index of the item containing `page_number`
    pub fn item_index_for_page(&self, page_number: u32) -> Option<usize> {
        self.virtual_items.iter().position(|item| item.contains_page(page_number))
    }

    /// The item and page layout for `page_number`
    pub fn find_page(&self, page_number: u32) -> Option<(&VirtualItem, &PageLayout)> {
        let item = self.virtual_items.iter().find(|item| item.contains_page(page_number))?;
        let layout = item.page_layout(page_number)?;
        Some((item, layout))
    }

    /// Unscaled rectangle of a page in content space
    ///
    /// Items narrower than the content are centered across the scroll axis,
    /// the way the host lays them out.
    pub fn page_rect(&self, page_number: u32) -> Option<Rect> {
        let (item, layout) = self.find_page(page_number)?;
        let total_cross = self.axis.cross_size(self.total_content_size);
        let centering = if item.cross_axis_size < total_cross {
            (total_cross - item.cross_axis_size) / 2.0
        } else {
            0.0
        };

        let item_origin = self.axis.point(item.offset, centering);
        Some(Rect::new(
            item_origin.x + layout.x,
            item_origin.y + layout.y,
            layout.width,
            layout.height,
        ))
    }
}
