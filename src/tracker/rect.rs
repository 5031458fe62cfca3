use std::ops::Range;

use nalgebra::Point2;

/// Axis-aligned bounding region in image coordinates.
///
/// Coordinates are always ordered `(min_y, min_x, max_y, max_x)`, i.e.
/// top, left, bottom, right. Every constructor and accessor in the crate
/// uses this order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
    /// Top edge
    pub min_y: f32,
    /// Left edge
    pub min_x: f32,
    /// Bottom edge
    pub max_y: f32,
    /// Right edge
    pub max_x: f32,
}

impl BoundingBox {
    /// Create a box from `(min_y, min_x, max_y, max_x)`.
    #[inline]
    pub fn new(min_y: f32, min_x: f32, max_y: f32, max_x: f32) -> Self {
        Self {
            min_y,
            min_x,
            max_y,
            max_x,
        }
    }

    /// Create a box from its top-left corner and dimensions.
    #[inline]
    pub fn from_top_left(top: f32, left: f32, height: f32, width: f32) -> Self {
        Self::new(top, left, top + height, left + width)
    }

    /// Create a box from its center point and dimensions.
    #[inline]
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(
            cy - height / 2.0,
            cx - width / 2.0,
            cy + height / 2.0,
            cx + width / 2.0,
        )
    }

    /// Coordinates in `(min_y, min_x, max_y, max_x)` order.
    #[inline]
    pub fn to_array(&self) -> [f32; 4] {
        [self.min_y, self.min_x, self.max_y, self.max_x]
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    /// Midpoint of the box as an `(x, y)` point.
    #[inline]
    pub fn centroid(&self) -> Point2<f32> {
        Point2::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Height over width, or `None` when either dimension is not positive.
    pub fn aspect_ratio(&self) -> Option<f32> {
        let (h, w) = (self.height(), self.width());
        if h > 0.0 && w > 0.0 { Some(h / w) } else { None }
    }

    /// Whether `point` lies inside the box, edges included.
    pub fn contains(&self, point: &Point2<f32>) -> bool {
        (self.min_x..=self.max_x).contains(&point.x) && (self.min_y..=self.max_y).contains(&point.y)
    }

    /// Row and column ranges of the box clamped to an image of
    /// `rows x cols` pixels, or `None` if nothing of the box remains.
    pub fn clamped_ranges(&self, rows: usize, cols: usize) -> Option<(Range<usize>, Range<usize>)> {
        let clamp = |v: f32, limit: usize| -> usize {
            if v.is_nan() || v <= 0.0 {
                0
            } else {
                (v as usize).min(limit)
            }
        };

        let y0 = clamp(self.min_y, rows);
        let x0 = clamp(self.min_x, cols);
        let y1 = clamp(self.max_y, rows);
        let x1 = clamp(self.max_x, cols);

        if y1 > y0 && x1 > x0 {
            Some((y0..y1, x0..x1))
        } else {
            None
        }
    }
}
