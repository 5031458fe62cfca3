//! IdentityCoordinator binding short-lived tracks to durable identities.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use nalgebra::Point2;
use ndarray::{ArrayView3, s};
use serde::{Deserialize, Serialize};

use super::refinement::{RefinedDetection, RefinementEngine};
use super::{DetectionSource, EmbeddingExtractor};
use crate::error::ConfigError;
use crate::reid::{FeatureBank, FeatureBankConfig, IdentityId};
use crate::tracker::{
    BoundingBox, Detection, Embedding, FrameTracker, Track, TrackId, TrackerConfig,
};

/// Anything that filters a frame's raw detections before tracking.
pub trait Refine {
    fn refine(
        &mut self,
        image: ArrayView3<'_, u8>,
        detections: Vec<Detection>,
    ) -> Vec<RefinedDetection>;
}

impl<V: DetectionSource> Refine for RefinementEngine<V> {
    fn refine(
        &mut self,
        image: ArrayView3<'_, u8>,
        detections: Vec<Detection>,
    ) -> Vec<RefinedDetection> {
        RefinementEngine::refine(self, image, detections)
    }
}

/// Configuration for the IdentityCoordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub tracker: TrackerConfig,
    pub feature_bank: FeatureBankConfig,
    /// Run the refinement stage when one is attached
    pub refine: bool,
    /// Identities unseen for longer than this are swept
    pub max_identity_age_secs: u64,
    /// Minimum time between two staleness sweeps
    pub sweep_interval_secs: u64,
    /// Minimum time between two gallery store synchronizations
    pub sync_interval_secs: u64,
    /// Identities the staleness sweep never removes
    pub protected_ids: Vec<IdentityId>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            feature_bank: FeatureBankConfig::default(),
            refine: true,
            max_identity_age_secs: 86_400,
            sweep_interval_secs: 60,
            sync_interval_secs: 300,
            protected_ids: Vec::new(),
        }
    }
}

/// Binding state of a live track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingState {
    /// No identity resolved yet
    Unbound,
    /// Resolved once; stays until the track is destroyed
    Bound(IdentityId),
}

/// A live track annotated with its durable identity.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifiedTrack {
    pub identity_id: IdentityId,
    pub track_id: TrackId,
    pub centroid: Point2<f32>,
    pub bbox: BoundingBox,
    /// Detector or refinement confidence of the current detection
    pub confidence: Option<f32>,
}

/// Per-frame glue between detection, tracking and re-identification.
///
/// Each new track gets its identity resolved once, from the first frame in
/// which an embedding is available for it. The binding lives exactly as
/// long as the track.
pub struct IdentityCoordinator<D: DetectionSource, E: EmbeddingExtractor> {
    detector: D,
    extractor: E,
    refiner: Option<Box<dyn Refine + Send>>,
    tracker: FrameTracker,
    bank: FeatureBank,
    bindings: BTreeMap<TrackId, IdentityId>,
    config: CoordinatorConfig,
    last_sweep: Option<DateTime<Utc>>,
    last_sync: Option<DateTime<Utc>>,
    published: Arc<RwLock<Vec<IdentifiedTrack>>>,
}

impl<D: DetectionSource, E: EmbeddingExtractor> IdentityCoordinator<D, E> {
    /// Create a coordinator with a local-only feature bank.
    pub fn new(detector: D, extractor: E, config: CoordinatorConfig) -> Result<Self, ConfigError> {
        let tracker = FrameTracker::new(config.tracker.clone())?;
        let bank = FeatureBank::new(config.feature_bank.clone())?;
        Ok(Self {
            detector,
            extractor,
            refiner: None,
            tracker,
            bank,
            bindings: BTreeMap::new(),
            config,
            last_sweep: None,
            last_sync: None,
            published: Arc::new(RwLock::new(Vec::new())),
        })
    }

    /// Replace the feature bank, e.g. with one backed by a gallery store.
    pub fn with_feature_bank(mut self, bank: FeatureBank) -> Self {
        self.bank = bank;
        self
    }

    /// Attach a refinement stage in front of the tracker.
    pub fn with_refiner(mut self, refiner: impl Refine + Send + 'static) -> Self {
        self.refiner = Some(Box::new(refiner));
        self
    }

    /// Detect, refine, track and identify one frame.
    ///
    /// A detector failure is returned as is; tracker and bindings are left
    /// untouched for that frame.
    pub fn update(&mut self, image: ArrayView3<'_, u8>) -> Result<Vec<IdentifiedTrack>, D::Error> {
        let detections = self.detector.detect(image)?;
        Ok(self.update_with_detections(image, detections))
    }

    /// [`update`](Self::update) for detections the caller already has.
    pub fn update_with_detections(
        &mut self,
        image: ArrayView3<'_, u8>,
        detections: Vec<Detection>,
    ) -> Vec<IdentifiedTrack> {
        let detections = self.refine(image, detections);
        self.tracker.update(&detections);

        let tracker = &self.tracker;
        self.bindings.retain(|track_id, identity_id| {
            let live = tracker.contains(*track_id);
            if !live {
                log::debug!("Binding dropped: track {track_id} ({identity_id})");
            }
            live
        });

        let now = Utc::now();
        for track in self.tracker.tracks() {
            let Some(det_idx) = track.detection else {
                continue;
            };
            if let Some(identity_id) = self.bindings.get(&track.track_id) {
                self.bank.mark_seen_at(identity_id, now);
                continue;
            }
            let detection = &detections[det_idx];
            if let Some(embedding) = embedding_for(&mut self.extractor, image, detection) {
                let identity_id = self.bank.resolve_at(&embedding, now);
                log::debug!("Track {} bound to {}", track.track_id, identity_id);
                self.bindings.insert(track.track_id, identity_id);
            }
        }

        let identified: Vec<IdentifiedTrack> = self
            .tracker
            .tracks()
            .iter()
            .filter_map(|track| self.identify(track, &detections))
            .collect();

        match self.published.write() {
            Ok(mut published) => *published = identified.clone(),
            Err(err) => log::warn!("Published snapshot lock poisoned: {err}"),
        }

        identified
    }

    /// Rate-limited gallery housekeeping, meant to be called from the
    /// processing loop or a timer.
    ///
    /// Flushes and re-syncs the gallery store at most once per
    /// `sync_interval_secs`, and sweeps stale identities at most once per
    /// `sweep_interval_secs`. Returns the identities the sweep removed.
    pub fn maintain(&mut self, now: DateTime<Utc>) -> Vec<IdentityId> {
        if due(self.last_sync, now, self.config.sync_interval_secs) {
            self.last_sync = Some(now);
            self.bank.flush();
            self.bank.sync();
        }

        if !due(self.last_sweep, now, self.config.sweep_interval_secs) {
            return Vec::new();
        }
        self.last_sweep = Some(now);
        let max_age = seconds(self.config.max_identity_age_secs);
        self.bank.expire_at(now, max_age, &self.config.protected_ids)
    }

    /// Binding state of a track, or `None` if the track is not live.
    pub fn binding_state(&self, track_id: TrackId) -> Option<BindingState> {
        if !self.tracker.contains(track_id) {
            return None;
        }
        Some(match self.bindings.get(&track_id) {
            Some(id) => BindingState::Bound(id.clone()),
            None => BindingState::Unbound,
        })
    }

    pub fn bindings(&self) -> &BTreeMap<TrackId, IdentityId> {
        &self.bindings
    }

    /// Handle to the latest frame's output, for readers on other threads.
    pub fn published(&self) -> Arc<RwLock<Vec<IdentifiedTrack>>> {
        Arc::clone(&self.published)
    }

    pub fn tracker(&self) -> &FrameTracker {
        &self.tracker
    }

    pub fn feature_bank(&self) -> &FeatureBank {
        &self.bank
    }

    pub fn feature_bank_mut(&mut self) -> &mut FeatureBank {
        &mut self.bank
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    fn refine(&mut self, image: ArrayView3<'_, u8>, detections: Vec<Detection>) -> Vec<Detection> {
        match self.refiner.as_mut() {
            Some(refiner) if self.config.refine => refiner
                .refine(image, detections)
                .into_iter()
                .map(|r| Detection {
                    confidence: Some(r.fused_confidence),
                    ..r.detection
                })
                .collect(),
            _ => detections,
        }
    }

    fn identify(&self, track: &Track, detections: &[Detection]) -> Option<IdentifiedTrack> {
        let detection = &detections[track.detection?];
        let identity_id = self.bindings.get(&track.track_id)?;
        Some(IdentifiedTrack {
            identity_id: identity_id.clone(),
            track_id: track.track_id,
            centroid: track.centroid,
            bbox: detection.bbox,
            confidence: detection.confidence,
        })
    }
}

/// Embedding carried by the detection, or extracted from its crop.
fn embedding_for<E: EmbeddingExtractor>(
    extractor: &mut E,
    image: ArrayView3<'_, u8>,
    detection: &Detection,
) -> Option<Embedding> {
    if let Some(embedding) = &detection.embedding {
        return Some(embedding.clone());
    }
    let (rows, cols, _) = image.dim();
    let (ys, xs) = detection.bbox.clamped_ranges(rows, cols)?;
    match extractor.extract(image.slice(s![ys, xs, ..])) {
        Ok(embedding) => Some(embedding),
        Err(err) => {
            log::warn!("Embedding extraction failed, track stays unbound: {err}");
            None
        }
    }
}

fn seconds(secs: u64) -> Duration {
    Duration::try_seconds(i64::try_from(secs).unwrap_or(i64::MAX)).unwrap_or(Duration::MAX)
}

fn due(last: Option<DateTime<Utc>>, now: DateTime<Utc>, interval_secs: u64) -> bool {
    match last {
        None => true,
        Some(last) => now - last >= seconds(interval_secs),
    }
}
