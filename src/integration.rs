//! Integration of the tracker and the re-identification layer with the
//! external models around them.
//!
//! This module provides the collaborator traits (detector, verifier,
//! embedding extractor), the refinement stage that filters raw detections,
//! and the coordinator that runs a whole frame end to end.

mod builder;
mod coordinator;
mod detector;
mod refinement;

pub use builder::DetectionBuilder;
pub use coordinator::{
    BindingState, CoordinatorConfig, IdentifiedTrack, IdentityCoordinator, Refine,
};
pub use detector::{CarriedEmbeddings, DetectionSource, EmbeddingExtractor, NoEmbedding};
pub use refinement::{RefinedDetection, RefinementConfig, RefinementEngine, geometric_score};
