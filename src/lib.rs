//! Track-and-identify core.
//!
//! Per-frame detections are linked into short-lived tracks by
//! [`FrameTracker`], and each new track is resolved once against a gallery
//! of appearance embeddings by [`FeatureBank`] to get a durable
//! [`IdentityId`]. [`RefinementEngine`] can sit in front of the tracker to
//! reject implausible detections, and [`IdentityCoordinator`] runs the
//! whole chain for one frame.
//!
//! Boxes use `(min_y, min_x, max_y, max_x)` pixel coordinates throughout.
//!
//! All components are synchronous and expect one `update` per frame from a
//! single thread. Readers on other threads can follow the latest output
//! through [`IdentityCoordinator::published`].

pub mod error;
pub mod integration;
pub mod reid;
pub mod tracker;

pub use error::{ConfigError, StoreError};
pub use integration::{
    BindingState, CarriedEmbeddings, CoordinatorConfig, DetectionBuilder, DetectionSource,
    EmbeddingExtractor, IdentifiedTrack, IdentityCoordinator, RefinedDetection, RefinementConfig,
    RefinementEngine,
};
pub use reid::{
    FeatureBank, FeatureBankConfig, GalleryRecord, GalleryStore, Identity, IdentityId,
    MemoryGallery,
};
pub use tracker::{
    AssignmentStrategy, BoundingBox, Detection, Embedding, FrameTracker, Track, TrackId,
    TrackerConfig,
};
