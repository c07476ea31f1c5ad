use serde::{Deserialize, Serialize};

/// Point in logical screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned rectangle in pixels. Width and height may be zero or negative
/// when produced by a transform; `is_valid` tells the two apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Grow the rectangle by `margin` pixels on every side.
    pub fn grow(&self, margin: i32) -> Self {
        Self::new(
            self.x - margin,
            self.y - margin,
            self.width + 2 * margin,
            self.height + 2 * margin,
        )
    }

    /// Clip to a `width` x `height` frame. Returns `None` when nothing is left.
    pub fn clip(&self, width: u32, height: u32) -> Option<Self> {
        let left = self.x.max(0);
        let top = self.y.max(0);
        let right = self.right().min(width as i32);
        let bottom = self.bottom().min(height as i32);
        if right <= left || bottom <= top {
            return None;
        }
        Some(Self::new(left, top, right - left, bottom - top))
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn contains_point(&self, point: &Point) -> bool {
        point.x >= self.x as f64
            && point.y >= self.y as f64
            && point.x < self.right() as f64
            && point.y < self.bottom() as f64
    }

    /// Rectangle of the given size centered on `center`.
    pub fn centered(center: Point, width: i32, height: i32) -> Self {
        Self::new(
            (center.x - width as f64 / 2.0).round() as i32,
            (center.y - height as f64 / 2.0).round() as i32,
            width,
            height,
        )
    }
}
