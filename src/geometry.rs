use serde::{Deserialize, Serialize};

/// A point in pixels. Used both for canvas-space overlay positions and for
/// client-space pointer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Replaces negative or non-finite components with zero.
    pub fn non_negative(self) -> Self {
        let fix = |v: f32| if v.is_finite() { v.max(0.0) } else { 0.0 };
        Self::new(fix(self.x), fix(self.y))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    pub const fn from_size(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    /// Clamps the top-left corner of a box of `inner` size so the box stays
    /// inside a region of this rect's size. When the box is larger than the
    /// region on an axis, that axis is pinned to zero.
    pub fn clamp_box(&self, top_left: Point, inner: Size) -> Point {
        let max_x = (self.size.width - inner.width).max(0.0);
        let max_y = (self.size.height - inner.height).max(0.0);
        let p = top_left.non_negative();
        Point::new(p.x.min(max_x), p.y.min(max_y))
    }
}
