//! Similarity metrics shared by the tracker and the re-identification layer.

use nalgebra::Point2;
use ndarray::{Array1, ArrayView1};

/// Fixed-length appearance vector produced by an external model.
pub type Embedding = Array1<f32>;

/// Cosine similarity of two vectors.
///
/// Returns 0.0 when either vector has zero norm or the lengths differ.
pub fn cosine_similarity(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    if a.len() != b.len() {
        log::trace!("cosine similarity of mismatched lengths {} and {}", a.len(), b.len());
        return 0.0;
    }

    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    a.dot(&b) / (norm_a * norm_b)
}

/// Euclidean distance between two points divided by `scale`, capped at 1.0.
///
/// `scale` is the distance considered "far"; it must be positive.
pub fn spatial_distance(a: &Point2<f32>, b: &Point2<f32>, scale: f32) -> f32 {
    (nalgebra::distance(a, b) / scale).min(1.0)
}

/// Exponential moving average: `momentum * old + (1 - momentum) * new`.
pub fn blend(old: ArrayView1<'_, f32>, new: ArrayView1<'_, f32>, momentum: f32) -> Embedding {
    if old.len() != new.len() {
        return new.to_owned();
    }
    &old * momentum + &new * (1.0 - momentum)
}
