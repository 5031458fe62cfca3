//! Builder for creating Detection objects from various input formats.

use crate::tracker::{BoundingBox, Detection, Embedding};

/// Builder for creating `Detection` objects from various input formats.
///
/// Every box setter converts to the crate's `(min_y, min_x, max_y, max_x)`
/// convention.
#[derive(Debug, Clone, Default)]
pub struct DetectionBuilder {
    bbox: BoundingBox,
    embedding: Option<Embedding>,
    confidence: Option<f32>,
}

impl DetectionBuilder {
    /// Create a new detection builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bounding box as `(min_y, min_x, max_y, max_x)`.
    pub fn yxyx(mut self, min_y: f32, min_x: f32, max_y: f32, max_x: f32) -> Self {
        self.bbox = BoundingBox::new(min_y, min_x, max_y, max_x);
        self
    }

    /// Set bounding box as `(x1, y1, x2, y2)` corner coordinates.
    pub fn xyxy(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.bbox = BoundingBox::new(y1, x1, y2, x2);
        self
    }

    /// Set bounding box in XYWH format (center_x, center_y, width, height).
    pub fn xywh(mut self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.bbox = BoundingBox::from_center(cx, cy, w, h);
        self
    }

    /// Set bounding box in TLWH format (top, left, width, height).
    pub fn tlwh(mut self, t: f32, l: f32, w: f32, h: f32) -> Self {
        self.bbox = BoundingBox::from_top_left(t, l, h, w);
        self
    }

    /// Scale a box given in `[0, 1]` normalized `(min_y, min_x, max_y, max_x)`
    /// to an image of `rows x cols` pixels.
    pub fn normalized_yxyx(self, b: [f32; 4], rows: usize, cols: usize) -> Self {
        let (h, w) = (rows as f32, cols as f32);
        self.yxyx(b[0] * h, b[1] * w, b[2] * h, b[3] * w)
    }

    /// Attach an appearance embedding.
    pub fn embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Set the detector confidence.
    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Build the final `Detection`.
    pub fn build(self) -> Detection {
        Detection {
            bbox: self.bbox,
            embedding: self.embedding,
            confidence: self.confidence,
        }
    }
}
