//! Rectangle geometry shared by every matcher

use serde::{Deserialize, Serialize};

/// Axis-aligned integer rectangle (x, y, width, height)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    /// Create a rectangle; negative sizes are clamped to zero
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width: width.max(0),
            height: height.max(0),
        }
    }

    /// Whether the rectangle covers no pixels
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// Center point (integer division)
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Scale the rectangle around its own center.
    ///
    /// A factor below 1.0 shrinks toward the center. The scaled size is
    /// truncated first and the leftover margin split evenly, so the center
    /// moves by at most half a pixel.
    pub fn center_zoom(&self, factor: f64) -> Rect {
        let width = (self.width as f64 * factor) as i32;
        let height = (self.height as f64 * factor) as i32;
        Rect::new(
            self.x + (self.width - width) / 2,
            self.y + (self.height - height) / 2,
            width,
            height,
        )
    }

    /// Shift by `offset.x`/`offset.y` and take the size of `offset`
    pub fn move_by(&self, offset: &Rect) -> Rect {
        Rect::new(
            self.x + offset.x,
            self.y + offset.y,
            offset.width,
            offset.height,
        )
    }

    /// Intersection of two rectangles (empty when they do not overlap)
    pub fn intersect(&self, other: &Rect) -> Rect {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return Rect::default();
        }
        Rect::new(left, top, right - left, bottom - top)
    }

    /// Clip to an image of the given dimensions
    pub fn clip_to(&self, width: u32, height: u32) -> Rect {
        self.intersect(&Rect::new(0, 0, width as i32, height as i32))
    }

    /// Whether `other` lies entirely inside this rectangle
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{},{},{}]", self.x, self.y, self.width, self.height)
    }
}
