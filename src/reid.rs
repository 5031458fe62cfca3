//! Re-identification layer: durable identities resolved by appearance.

mod feature_bank;
mod gallery;
mod identity;

pub use feature_bank::{FeatureBank, FeatureBankConfig};
pub use gallery::{GalleryStore, MemoryGallery, Metadata};
pub use identity::{GalleryRecord, Identity, IdentityId};
