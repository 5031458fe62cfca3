//! Frame-to-frame tracker fusing centroid distance with appearance.

use std::collections::BTreeMap;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, check_non_negative, check_positive, check_unit};
use crate::tracker::matching::{
    self, AssignmentResult, AssignmentStrategy, CostInput, CostWeights, Detection,
};
use crate::tracker::similarity::Embedding;
use crate::tracker::track::{Track, TrackId};

/// Configuration for the FrameTracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Updates a track may go unmatched before it is destroyed
    pub max_disappeared: u32,
    /// Weight of appearance against spatial distance, in `[0, 1]`
    pub feature_weight: f32,
    /// Centroid distance at which the spatial term saturates
    pub spatial_scale: f32,
    /// Pairs costing more than this are not matched
    pub max_match_cost: f32,
    /// Share of the old embedding kept when a match is blended in
    pub feature_momentum: f32,
    pub assignment: AssignmentStrategy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_disappeared: 40,
            feature_weight: 0.7,
            spatial_scale: 500.0,
            max_match_cost: 0.8,
            feature_momentum: 0.8,
            assignment: AssignmentStrategy::Greedy,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("feature_weight", self.feature_weight)?;
        check_unit("feature_momentum", self.feature_momentum)?;
        check_positive("spatial_scale", self.spatial_scale)?;
        check_non_negative("max_match_cost", self.max_match_cost)?;
        Ok(())
    }

    fn weights(&self) -> CostWeights {
        CostWeights {
            feature_weight: self.feature_weight,
            spatial_scale: self.spatial_scale,
        }
    }
}

/// Multi-object tracker keyed by monotonically increasing track ids.
///
/// Live tracks are kept in a vector in registration order. Because ids are
/// issued in increasing order this is also ascending id order, and it is
/// the order used to break ties during assignment.
#[derive(Debug, Clone)]
pub struct FrameTracker {
    tracks: Vec<Track>,
    next_id: TrackId,
    frame_id: u64,
    config: TrackerConfig,
}

impl FrameTracker {
    pub fn new(config: TrackerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            tracks: Vec::new(),
            next_id: 0,
            frame_id: 0,
            config,
        })
    }

    /// Feed one frame of detections and return the live tracks' centroids.
    ///
    /// Embeddings carried by the detections take part in matching; a
    /// detection without one can still match on position alone.
    pub fn update(&mut self, detections: &[Detection]) -> BTreeMap<TrackId, Point2<f32>> {
        self.frame_id += 1;

        if detections.is_empty() {
            for track in &mut self.tracks {
                track.mark_missed();
            }
            self.remove_expired();
            return self.centroids();
        }

        if self.tracks.is_empty() {
            for (idx, det) in detections.iter().enumerate() {
                self.register(det, idx);
            }
            return self.centroids();
        }

        let track_inputs: Vec<CostInput<'_>> = self.tracks.iter().map(Track::cost_input).collect();
        let det_inputs: Vec<CostInput<'_>> = detections
            .iter()
            .map(|d| CostInput {
                centroid: d.centroid(),
                embedding: d.embedding.as_ref(),
            })
            .collect();
        let costs = matching::cost_matrix(&track_inputs, &det_inputs, self.config.weights());
        log::trace!("frame {} costs: {:?}", self.frame_id, costs);

        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = matching::assign(&costs, self.config.max_match_cost, self.config.assignment);

        for (row, col) in matches {
            let track = &mut self.tracks[row];
            track.update(&detections[col], col, self.config.feature_momentum);
            let cost = costs[[row, col]];
            log::trace!("track {} matched detection {col} at cost {cost:.3}", track.track_id);
        }

        for row in unmatched_tracks {
            self.tracks[row].mark_missed();
        }
        self.remove_expired();

        for col in unmatched_detections {
            self.register(&detections[col], col);
        }

        self.centroids()
    }

    /// Live tracks in ascending id order.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn get(&self, track_id: TrackId) -> Option<&Track> {
        self.tracks
            .binary_search_by_key(&track_id, |t| t.track_id)
            .ok()
            .map(|idx| &self.tracks[idx])
    }

    /// Current blended embedding of a live track.
    pub fn feature(&self, track_id: TrackId) -> Option<&Embedding> {
        self.get(track_id).and_then(|t| t.embedding.as_ref())
    }

    pub fn contains(&self, track_id: TrackId) -> bool {
        self.get(track_id).is_some()
    }

    /// Live track ids mapped to their centroids.
    pub fn centroids(&self) -> BTreeMap<TrackId, Point2<f32>> {
        self.tracks.iter().map(|t| (t.track_id, t.centroid)).collect()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Number of updates processed so far.
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn register(&mut self, det: &Detection, det_idx: usize) {
        let track = Track::new(self.next_id, det, det_idx);
        log::debug!("Track registered: {} at {:?}", track.track_id, track.centroid);
        self.tracks.push(track);
        self.next_id += 1;
    }

    fn remove_expired(&mut self) {
        let max_disappeared = self.config.max_disappeared;
        self.tracks.retain(|t| {
            let keep = t.disappeared <= max_disappeared;
            if !keep {
                log::debug!("Track removed: {} after {} missed frames", t.track_id, t.disappeared);
            }
            keep
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn tracker(max_disappeared: u32) -> FrameTracker {
        FrameTracker::new(TrackerConfig {
            max_disappeared,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_first_frame_registers_all() {
        let mut t = tracker(3);
        let out = t.update(&[
            Detection::new(0.0, 0.0, 10.0, 10.0),
            Detection::new(100.0, 100.0, 120.0, 120.0),
        ]);
        assert_eq!(out.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(out[&1], Point2::new(110.0, 110.0));
        assert!(t.tracks().iter().all(Track::is_visible));
    }

    #[test]
    fn test_empty_update_on_empty_tracker() {
        let mut t = tracker(3);
        assert!(t.update(&[]).is_empty());
        assert_eq!(t.frame_id(), 1);
    }

    #[test]
    fn test_unmatched_tracks_and_new_detections_in_same_frame() {
        let mut t = tracker(1);
        t.update(&[Detection::new(0.0, 0.0, 10.0, 10.0)]);

        // Far away: spatial term saturates, no features -> cost 1.0 > 0.8
        let out = t.update(&[Detection::new(900.0, 900.0, 910.0, 910.0)]);
        assert_eq!(out.len(), 2);
        assert_eq!(t.get(0).unwrap().disappeared, 1);
        assert_eq!(t.get(1).unwrap().disappeared, 0);

        let out = t.update(&[Detection::new(900.0, 900.0, 910.0, 910.0)]);
        assert_eq!(out.keys().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_appearance_disambiguates_crossing_tracks() {
        let mut t = FrameTracker::new(TrackerConfig {
            feature_weight: 0.9,
            ..Default::default()
        })
        .unwrap();
        let red = array![1.0_f32, 0.0, 0.0];
        let blue = array![0.0_f32, 1.0, 0.0];
        t.update(&[
            Detection::new(0.0, 0.0, 20.0, 20.0).with_embedding(red.clone()),
            Detection::new(0.0, 40.0, 20.0, 60.0).with_embedding(blue.clone()),
        ]);

        // Positions swap; appearance keeps identities
        t.update(&[
            Detection::new(0.0, 0.0, 20.0, 20.0).with_embedding(blue),
            Detection::new(0.0, 40.0, 20.0, 60.0).with_embedding(red),
        ]);
        assert_eq!(t.get(0).unwrap().centroid, Point2::new(50.0, 10.0));
        assert_eq!(t.get(1).unwrap().centroid, Point2::new(10.0, 10.0));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_feature_lookup() {
        let mut t = tracker(3);
        t.update(&[Detection::new(0.0, 0.0, 10.0, 10.0).with_embedding(array![1.0_f32, 0.0])]);
        assert_eq!(t.feature(0), Some(&array![1.0_f32, 0.0]));
        assert_eq!(t.feature(7), None);
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let err = FrameTracker::new(TrackerConfig {
            feature_weight: 1.2,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfUnitRange { name: "feature_weight", .. }));

        assert!(
            FrameTracker::new(TrackerConfig {
                spatial_scale: 0.0,
                ..Default::default()
            })
            .is_err()
        );
    }

    #[test]
    fn test_config_from_partial_json() {
        let cfg: TrackerConfig =
            serde_json::from_str(r#"{"max_disappeared": 5, "assignment": "optimal"}"#).unwrap();
        assert_eq!(cfg.max_disappeared, 5);
        assert_eq!(cfg.assignment, AssignmentStrategy::Optimal);
        assert_eq!(cfg.spatial_scale, 500.0);
    }
}
