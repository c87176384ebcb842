use serde::{Deserialize, Serialize};

fn clamp01(value: f32) -> f32 {
    if value < 0.0 {
        0.0
    } else if value > 1.0 {
        1.0
    } else {
        value
    }
}

/// Screen-space rectangle in pixel coordinates, `{left, top, right, bottom}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_size(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            right: left + width,
            bottom: top + height,
        }
    }

    /// Width is never negative, even for a degenerate rect.
    pub fn width(&self) -> i32 {
        (self.right - self.left).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.bottom - self.top).max(0)
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn center(&self) -> (i32, i32) {
        (
            self.left + self.width() / 2,
            self.top + self.height() / 2,
        )
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    /// Point at fractional position inside the rect, e.g. (0.25, 0.75) is 25%
    /// from the left and 75% down. Fractions are clamped to [0, 1].
    pub fn point_at(&self, fx: f32, fy: f32) -> (i32, i32) {
        let x = self.left as f32 + clamp01(fx) * self.width() as f32;
        let y = self.top as f32 + clamp01(fy) * self.height() as f32;
        (x.round() as i32, y.round() as i32)
    }

    /// Sub-rectangle given fractional edges relative to this rect.
    pub fn sub_region(&self, left: f32, top: f32, right: f32, bottom: f32) -> Rect {
        let (l, t) = self.point_at(left, top);
        let (r, b) = self.point_at(right, bottom);
        Rect::new(l, t, r.max(l), b.max(t))
    }

    /// Clip to the bounds of a `width` x `height` frame anchored at (0, 0).
    pub fn clipped_to(&self, width: u32, height: u32) -> Rect {
        Rect {
            left: self.left.clamp(0, width as i32),
            top: self.top.clamp(0, height as i32),
            right: self.right.clamp(0, width as i32),
            bottom: self.bottom.clamp(0, height as i32),
        }
    }
}
