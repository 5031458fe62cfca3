mod frame_tracker;
mod matching;
mod rect;
mod similarity;
mod track;

pub use frame_tracker::{FrameTracker, TrackerConfig};
pub use matching::{
    AssignmentResult, AssignmentStrategy, CostInput, CostWeights, Detection, assign, cost_matrix,
    fused_cost, greedy_assignment, linear_assignment,
};
pub use rect::BoundingBox;
pub use similarity::{Embedding, blend, cosine_similarity, spatial_distance};
pub use track::{Track, TrackId};
