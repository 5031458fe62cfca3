//! Short-lived track state owned by the frame tracker.

use nalgebra::Point2;

use crate::tracker::matching::{CostInput, Detection};
use crate::tracker::similarity::{Embedding, blend};

/// Track identifiers are handed out in increasing order and never reused
/// by the tracker that issued them.
pub type TrackId = u64;

/// Single tracked object.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Unique track identifier
    pub track_id: TrackId,
    /// Centroid of the most recently matched detection
    pub centroid: Point2<f32>,
    /// Blended appearance embedding
    pub embedding: Option<Embedding>,
    /// Consecutive updates without a matching detection
    pub disappeared: u32,
    /// Index of the detection matched in the latest update, if any
    pub detection: Option<usize>,
}

impl Track {
    pub(crate) fn new(track_id: TrackId, det: &Detection, det_idx: usize) -> Self {
        Self {
            track_id,
            centroid: det.centroid(),
            embedding: det.embedding.clone(),
            disappeared: 0,
            detection: Some(det_idx),
        }
    }

    pub(crate) fn cost_input(&self) -> CostInput<'_> {
        CostInput {
            centroid: self.centroid,
            embedding: self.embedding.as_ref(),
        }
    }

    /// Apply a matched detection: take its centroid and fold its embedding
    /// into the running average.
    pub(crate) fn update(&mut self, det: &Detection, det_idx: usize, momentum: f32) {
        self.centroid = det.centroid();
        if let Some(new) = &det.embedding {
            self.embedding = Some(match &self.embedding {
                Some(old) => blend(old.view(), new.view(), momentum),
                None => new.clone(),
            });
        }
        self.disappeared = 0;
        self.detection = Some(det_idx);
    }

    /// Record a frame without a match.
    pub(crate) fn mark_missed(&mut self) {
        self.disappeared += 1;
        self.detection = None;
    }

    /// Whether the track was matched in the latest update.
    pub fn is_visible(&self) -> bool {
        self.detection.is_some()
    }
}
