use serde::{Deserialize, Serialize};

use super::point::Point;

/// Unclamped working rectangle, inclusive on all edges. May extend past the
/// image until clamped into a `PartBox`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    /// Smallest rect containing every point, `None` for an empty set.
    pub fn bounding(points: &[Point]) -> Option<Rect> {
        let first = points.first()?;

        Some(points.iter().fold(
            Rect {
                left: first.x,
                top: first.y,
                right: first.x,
                bottom: first.y,
            },
            |r, p| Rect {
                left: r.left.min(p.x),
                top: r.top.min(p.y),
                right: r.right.max(p.x),
                bottom: r.bottom.max(p.y),
            },
        ))
    }

    pub fn width(&self) -> u32 {
        self.right.abs_diff(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.abs_diff(self.top)
    }

    /// True when either side spans no more than `epsilon` pixels.
    pub fn is_degenerate(&self, epsilon: u32) -> bool {
        self.width() <= epsilon || self.height() <= epsilon
    }

    pub fn pad(&self, padding: u32) -> Rect {
        let p = padding.min(i32::MAX as u32) as i32;
        Rect {
            left: self.left.saturating_sub(p),
            top: self.top.saturating_sub(p),
            right: self.right.saturating_add(p),
            bottom: self.bottom.saturating_add(p),
        }
    }

    /// Clamps every edge into `[0, width - 1] x [0, height - 1]`. A rect that
    /// lies entirely outside the image collapses and yields `None`.
    pub fn clamp(&self, width: u32, height: u32) -> Option<PartBox> {
        if width == 0 || height == 0 {
            return None;
        }

        let max_x = (width - 1).min(i32::MAX as u32) as i32;
        let max_y = (height - 1).min(i32::MAX as u32) as i32;

        let b = PartBox {
            left: self.left.clamp(0, max_x) as u32,
            top: self.top.clamp(0, max_y) as u32,
            right: self.right.clamp(0, max_x) as u32,
            bottom: self.bottom.clamp(0, max_y) as u32,
        };

        if b.right <= b.left || b.bottom <= b.top {
            return None;
        }

        Some(b)
    }
}

/// Region of interest for one body part, in pixel coordinates clamped to the
/// image. Serialized as `[left, top, right, bottom]`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct PartBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl From<[u32; 4]> for PartBox {
    fn from([left, top, right, bottom]: [u32; 4]) -> PartBox {
        PartBox {
            left,
            top,
            right,
            bottom,
        }
    }
}

impl From<PartBox> for [u32; 4] {
    fn from(b: PartBox) -> [u32; 4] {
        [b.left, b.top, b.right, b.bottom]
    }
}

impl From<PartBox> for imageproc::rect::Rect {
    fn from(b: PartBox) -> imageproc::rect::Rect {
        imageproc::rect::Rect::at(b.left as i32, b.top as i32).of_size(b.w(), b.h())
    }
}

impl From<PartBox> for image::math::Rect {
    fn from(b: PartBox) -> image::math::Rect {
        image::math::Rect {
            x: b.left,
            y: b.top,
            width: b.w(),
            height: b.h(),
        }
    }
}

impl PartBox {
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> PartBox {
        PartBox {
            left,
            top,
            right,
            bottom,
        }
    }

    // pixel extents, edges inclusive
    pub fn w(&self) -> u32 {
        self.right - self.left + 1
    }

    pub fn h(&self) -> u32 {
        self.bottom - self.top + 1
    }
}
