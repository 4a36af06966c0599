//! Page geometry primitives
//!
//! Points, sizes and axis-aligned rectangles in either unscaled page space
//! (PDF points) or scaled screen space (pixels), plus the quarter-turn
//! rotation transforms used to move rectangles between a page's intrinsic
//! orientation and its displayed orientation.

use serde::{Deserialize, Serialize};

/// A point in 2D space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// Creates a point
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Multiply both coordinates by `factor`
    pub fn scale(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }
}

/// Width and height of a page or region
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    /// Creates a size
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Swap width and height
    pub fn swap(self) -> Self {
        Self::new(self.height, self.width)
    }

    /// Multiply both dimensions by `factor`
    pub fn scale(self, factor: f64) -> Self {
        Self::new(self.width * factor, self.height * factor)
    }

    /// Width times height
    pub fn area(self) -> f64 {
        self.width * self.height
    }
}

/// Axis-aligned rectangle described by its top-left origin and size
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    /// Creates a rect from its origin and size
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { origin: Point::new(x, y), size: Size::new(width, height) }
    }

    /// Left edge
    pub fn left(&self) -> f64 {
        self.origin.x
    }

    /// Top edge
    pub fn top(&self) -> f64 {
        self.origin.y
    }

    /// Right edge
    pub fn right(&self) -> f64 {
        self.origin.x + self.size.width
    }

    /// Bottom edge
    pub fn bottom(&self) -> f64 {
        self.origin.y + self.size.height
    }

    /// Width times height
    pub fn area(&self) -> f64 {
        self.size.area()
    }

    /// Scale origin and size by `factor`
    pub fn scale(self, factor: f64) -> Self {
        Self { origin: self.origin.scale(factor), size: self.size.scale(factor) }
    }

    /// Intersection of two rectangles
    ///
    /// Returns `None` when the overlap is empty or degenerate (zero width or
    /// zero height), so touching edges do not count as an intersection.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let left = self.left().max(other.left());
        let top = self.top().max(other.top());
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if left < right && top < bottom {
            Some(Rect::new(left, top, right - left, bottom - top))
        } else {
            None
        }
    }

    /// Check whether `other` lies entirely within this rectangle
    ///
    /// `tolerance` absorbs floating-point noise at the edges.
    pub fn contains_rect(&self, other: &Rect, tolerance: f64) -> bool {
        other.left() >= self.left() - tolerance
            && other.top() >= self.top() - tolerance
            && other.right() <= self.right() + tolerance
            && other.bottom() <= self.bottom() + tolerance
    }
}

/// Page rotation in clockwise quarter turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Degree0,
    Degree90,
    Degree180,
    Degree270,
}

impl Rotation {
    /// Number of clockwise quarter turns (0..=3)
    pub fn quarter_turns(self) -> u8 {
        match self {
            Rotation::Degree0 => 0,
            Rotation::Degree90 => 1,
            Rotation::Degree180 => 2,
            Rotation::Degree270 => 3,
        }
    }

    /// Build a rotation from any number of quarter turns
    pub fn from_quarter_turns(turns: u32) -> Self {
        match turns % 4 {
            0 => Rotation::Degree0,
            1 => Rotation::Degree90,
            2 => Rotation::Degree180,
            _ => Rotation::Degree270,
        }
    }

    /// Build a rotation from degrees; only multiples of 90 are accepted
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        if degrees % 90 != 0 {
            return None;
        }
        Some(Self::from_quarter_turns(degrees.rem_euclid(360) as u32 / 90))
    }

    /// Rotation in degrees, clockwise
    pub fn degrees(self) -> u16 {
        self.quarter_turns() as u16 * 90
    }

    /// The rotation that undoes this one
    pub fn inverse(self) -> Self {
        Self::from_quarter_turns(4 - self.quarter_turns() as u32)
    }

    /// Whether width and height trade places under this rotation
    pub fn swaps_axes(self) -> bool {
        self.quarter_turns() % 2 == 1
    }

    /// Compose two rotations
    pub fn combine(self, other: Rotation) -> Self {
        Self::from_quarter_turns(self.quarter_turns() as u32 + other.quarter_turns() as u32)
    }
}

/// Size of a container after rotating and scaling it
pub fn transform_size(size: Size, rotation: Rotation, scale: f64) -> Size {
    let size = if rotation.swaps_axes() { size.swap() } else { size };
    size.scale(scale)
}

/// Rotate a point inside a container of `container` size (unrotated)
pub fn rotate_position(container: Size, position: Point, rotation: Rotation) -> Point {
    match rotation {
        Rotation::Degree0 => position,
        Rotation::Degree90 => Point::new(container.height - position.y, position.x),
        Rotation::Degree180 => {
            Point::new(container.width - position.x, container.height - position.y)
        }
        Rotation::Degree270 => Point::new(position.y, container.width - position.x),
    }
}

/// Rotate a rectangle inside a container of `container` size (unrotated)
pub fn rotate_rect(container: Size, rect: Rect, rotation: Rotation) -> Rect {
    let Rect { origin, size } = rect;
    match rotation {
        Rotation::Degree0 => rect,
        Rotation::Degree90 => Rect {
            origin: Point::new(container.height - origin.y - size.height, origin.x),
            size: size.swap(),
        },
        Rotation::Degree180 => Rect {
            origin: Point::new(
                container.width - origin.x - size.width,
                container.height - origin.y - size.height,
            ),
            size,
        },
        Rotation::Degree270 => Rect {
            origin: Point::new(origin.y, container.width - origin.x - size.width),
            size: size.swap(),
        },
    }
}

/// Map a position from page space into rotated, scaled display space
pub fn transform_position(container: Size, position: Point, rotation: Rotation, scale: f64) -> Point {
    rotate_position(container, position, rotation).scale(scale)
}

/// Map a rectangle from page space into rotated, scaled display space
pub fn transform_rect(container: Size, rect: Rect, rotation: Rotation, scale: f64) -> Rect {
    rotate_rect(container, rect, rotation).scale(scale)
}

/// Map a rectangle from display space back into the page's intrinsic space
///
/// `container` is the *displayed* (rotated) container size. This is the
/// inverse of [`transform_rect`].
pub fn restore_rect(container: Size, rect: Rect, rotation: Rotation, scale: f64) -> Rect {
    rotate_rect(container, rect, rotation.inverse()).scale(1.0 / scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_rect_eq(a: Rect, b: Rect) {
        assert!((a.left() - b.left()).abs() < EPS, "{a:?} != {b:?}");
        assert!((a.top() - b.top()).abs() < EPS, "{a:?} != {b:?}");
        assert!((a.size.width - b.size.width).abs() < EPS, "{a:?} != {b:?}");
        assert!((a.size.height - b.size.height).abs() < EPS, "{a:?} != {b:?}");
    }

    #[test]
    fn test_intersection_rejects_touching_edges() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 10.0, 10.0);
        assert!(a.intersection(&b).is_none());

        let c = Rect::new(5.0, 5.0, 10.0, 10.0);
        assert_eq!(a.intersection(&c), Some(Rect::new(5.0, 5.0, 5.0, 5.0)));
    }

    #[test]
    fn test_transform_size_swaps_for_odd_turns() {
        let size = Size::new(600.0, 800.0);
        assert_eq!(transform_size(size, Rotation::Degree0, 2.0), Size::new(1200.0, 1600.0));
        assert_eq!(transform_size(size, Rotation::Degree90, 1.0), Size::new(800.0, 600.0));
        assert_eq!(transform_size(size, Rotation::Degree270, 0.5), Size::new(400.0, 300.0));
    }

    #[test]
    fn test_restore_undoes_transform_for_every_rotation() {
        let page = Size::new(600.0, 800.0);
        let rect = Rect::new(10.0, 20.0, 100.0, 50.0);

        for turns in 0..4 {
            let rotation = Rotation::from_quarter_turns(turns);
            let displayed = transform_rect(page, rect, rotation, 2.0);
            let container = transform_size(page, rotation, 2.0);
            let restored = restore_rect(container, displayed, rotation, 2.0);
            assert_rect_eq(restored, rect);
        }
    }

    #[test]
    fn test_rotate_90_moves_top_left_corner_to_top_right() {
        let page = Size::new(600.0, 800.0);
        let rotated = rotate_rect(page, Rect::new(0.0, 0.0, 100.0, 50.0), Rotation::Degree90);
        assert_rect_eq(rotated, Rect::new(750.0, 0.0, 50.0, 100.0));
    }

    #[test]
    fn test_rotation_degrees_roundtrip() {
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Degree270));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Degree90));
        assert_eq!(Rotation::from_degrees(45), None);
        assert_eq!(Rotation::Degree270.degrees(), 270);
        assert_eq!(Rotation::Degree90.inverse(), Rotation::Degree270);
        assert_eq!(Rotation::Degree180.combine(Rotation::Degree270), Rotation::Degree90);
    }
}
