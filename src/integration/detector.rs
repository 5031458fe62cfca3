//! Contracts for the external detection and feature-extraction models.

use ndarray::ArrayView3;
use thiserror::Error;

use crate::tracker::{Detection, Embedding};

/// Trait for object detection inference backends.
///
/// Images are `rows x cols x channels` arrays. Boxes in the returned
/// detections use `(min_y, min_x, max_y, max_x)` pixel coordinates of the
/// image that was passed in.
///
/// The same contract serves the upstream detector and the secondary
/// verifier used by [`RefinementEngine`](super::RefinementEngine).
///
/// # Example
///
/// ```ignore
/// use reid_track::{Detection, DetectionSource};
/// use ndarray::ArrayView3;
///
/// struct MyDetector {
///     // Your model here
/// }
///
/// impl DetectionSource for MyDetector {
///     type Error = std::io::Error;
///
///     fn detect(&mut self, image: ArrayView3<'_, u8>) -> Result<Vec<Detection>, Self::Error> {
///         // Run inference and return detections
///         Ok(vec![])
///     }
/// }
/// ```
pub trait DetectionSource {
    /// Error type for detection failures.
    type Error: std::fmt::Display;

    /// Run inference on an image and return detections.
    fn detect(&mut self, image: ArrayView3<'_, u8>) -> Result<Vec<Detection>, Self::Error>;
}

/// Trait for appearance models that embed a cropped detection.
pub trait EmbeddingExtractor {
    type Error: std::fmt::Display;

    /// Compute the embedding of a crop holding a single object.
    fn extract(&mut self, crop: ArrayView3<'_, u8>) -> Result<Embedding, Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("detection carries no embedding")]
pub struct NoEmbedding;

/// Extractor for pipelines whose detector already attaches embeddings.
///
/// It never produces an embedding itself, so a detection without one
/// leaves its track unbound.
#[derive(Debug, Clone, Copy, Default)]
pub struct CarriedEmbeddings;

impl EmbeddingExtractor for CarriedEmbeddings {
    type Error = NoEmbedding;

    fn extract(&mut self, _crop: ArrayView3<'_, u8>) -> Result<Embedding, Self::Error> {
        Err(NoEmbedding)
    }
}
