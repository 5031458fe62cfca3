//! False-positive suppression for a high-recall upstream detector.
//!
//! Each raw detection is scored twice: once on the plausibility of its box
//! shape for a person, once by running an independent verifier on the
//! cropped region. The two scores are fused linearly and the detection is
//! kept only when the fused score clears the acceptance threshold.

use ndarray::{ArrayView3, s};
use serde::{Deserialize, Serialize};

use super::DetectionSource;
use crate::error::{ConfigError, check_non_negative, check_unit};
use crate::tracker::{BoundingBox, Detection};

/// Configuration for the RefinementEngine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    pub geometry_weight: f32,
    pub verifier_weight: f32,
    /// Detections are kept when the fused score is strictly above this
    pub acceptance_threshold: f32,
    /// Verifier score when the verifier finds something in the crop
    pub present_score: f32,
    /// Verifier score when it finds nothing; absence is weak evidence
    pub absent_score: f32,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            geometry_weight: 0.4,
            verifier_weight: 0.6,
            acceptance_threshold: 0.4,
            present_score: 1.0,
            absent_score: 0.3,
        }
    }
}

impl RefinementConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("geometry_weight", self.geometry_weight)?;
        check_unit("verifier_weight", self.verifier_weight)?;
        let sum = self.geometry_weight + self.verifier_weight;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::WeightsNotNormalized { sum });
        }
        check_non_negative("acceptance_threshold", self.acceptance_threshold)?;
        check_unit("present_score", self.present_score)?;
        check_unit("absent_score", self.absent_score)?;
        Ok(())
    }
}

/// A detection that passed refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinedDetection {
    pub detection: Detection,
    /// Fused score rounded to two decimals
    pub fused_confidence: f32,
    pub geometric_score: f32,
    pub verifier_score: f32,
}

/// Score a box by how plausible its height/width ratio is for a standing
/// or seated person.
pub fn geometric_score(bbox: &BoundingBox) -> f32 {
    match bbox.aspect_ratio() {
        None => 0.0,
        Some(r) if r > 0.5 && r < 5.0 => 1.0,
        Some(r) if r > 0.3 && r < 7.0 => 0.5,
        Some(_) => 0.1,
    }
}

/// Round to two decimal places.
fn round2(v: f32) -> f32 {
    (v * 100.0).round() / 100.0
}

/// Filters raw detections with geometry and a secondary verifier.
pub struct RefinementEngine<V: DetectionSource> {
    verifier: V,
    config: RefinementConfig,
}

impl<V: DetectionSource> RefinementEngine<V> {
    pub fn new(verifier: V, config: RefinementConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        log::info!("RefinementEngine initialized");
        Ok(Self { verifier, config })
    }

    pub fn with_default_config(verifier: V) -> Result<Self, ConfigError> {
        Self::new(verifier, RefinementConfig::default())
    }

    /// Keep the detections whose fused score clears the threshold, in
    /// input order.
    pub fn refine(
        &mut self,
        image: ArrayView3<'_, u8>,
        detections: Vec<Detection>,
    ) -> Vec<RefinedDetection> {
        let mut refined = Vec::with_capacity(detections.len());

        for (idx, detection) in detections.into_iter().enumerate() {
            let geometric = geometric_score(&detection.bbox);
            let verifier = self.verifier_score(image, &detection.bbox);
            let fused = self.fuse(geometric, verifier);

            if fused > self.config.acceptance_threshold {
                log::info!(
                    "Detection {idx} kept: {fused:.2} (geo {geometric:.2}, verify {verifier:.2})"
                );
                refined.push(RefinedDetection {
                    detection,
                    fused_confidence: round2(fused),
                    geometric_score: geometric,
                    verifier_score: verifier,
                });
            } else {
                log::warn!(
                    "Detection {idx} dropped: {fused:.2} (geo {geometric:.2}, verify {verifier:.2})"
                );
            }
        }

        refined
    }

    /// Convex combination of the two sub-scores.
    pub fn fuse(&self, geometric: f32, verifier: f32) -> f32 {
        self.config.geometry_weight * geometric + self.config.verifier_weight * verifier
    }

    /// Run the verifier on the region of `bbox` clamped to the image.
    ///
    /// 0.0 for an empty crop or a verifier failure.
    pub fn verifier_score(&mut self, image: ArrayView3<'_, u8>, bbox: &BoundingBox) -> f32 {
        let (rows, cols, _) = image.dim();
        let Some((ys, xs)) = bbox.clamped_ranges(rows, cols) else {
            return 0.0;
        };
        let crop = image.slice(s![ys, xs, ..]);

        match self.verifier.detect(crop) {
            Ok(found) if !found.is_empty() => {
                log::debug!("Verifier confirmed {} object(s) in crop", found.len());
                self.config.present_score
            }
            Ok(_) => self.config.absent_score,
            Err(err) => {
                log::error!("Verifier failed: {err}");
                0.0
            }
        }
    }

    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    pub fn verifier_mut(&mut self) -> &mut V {
        &mut self.verifier
    }
}
