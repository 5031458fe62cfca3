//! Cost computation and assignment between tracks and detections.

use nalgebra::Point2;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::tracker::rect::BoundingBox;
use crate::tracker::similarity::{Embedding, cosine_similarity, spatial_distance};

/// Detection input for the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Bounding box in `(min_y, min_x, max_y, max_x)` order
    pub bbox: BoundingBox,
    /// Appearance embedding, when the detector provides one
    pub embedding: Option<Embedding>,
    /// Detector confidence, when the detector provides one
    pub confidence: Option<f32>,
}

impl Detection {
    pub fn new(min_y: f32, min_x: f32, max_y: f32, max_x: f32) -> Self {
        Self::from_box(BoundingBox::new(min_y, min_x, max_y, max_x))
    }

    pub fn from_box(bbox: BoundingBox) -> Self {
        Self {
            bbox,
            embedding: None,
            confidence: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    #[inline]
    pub fn centroid(&self) -> Point2<f32> {
        self.bbox.centroid()
    }
}

/// How the cost matrix is turned into track/detection pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    /// Rows in ascending order of their cheapest cost each take their
    /// cheapest column. Can be globally suboptimal.
    #[default]
    Greedy,
    /// Minimum total cost assignment (Jonker-Volgenant).
    Optimal,
}

/// Spatial and appearance evidence for one track or detection.
#[derive(Debug, Clone, Copy)]
pub struct CostInput<'a> {
    pub centroid: Point2<f32>,
    pub embedding: Option<&'a Embedding>,
}

/// Weights for the fused spatial/appearance cost.
#[derive(Debug, Clone, Copy)]
pub struct CostWeights {
    /// Weight given to appearance; spatial distance gets `1 - feature_weight`
    pub feature_weight: f32,
    /// Distance at which the spatial term saturates at 1.0
    pub spatial_scale: f32,
}

/// Fused cost of pairing a track with a detection. Lower is better.
///
/// Without an embedding on both sides the appearance term is 1.0.
pub fn fused_cost(track: &CostInput<'_>, det: &CostInput<'_>, weights: CostWeights) -> f32 {
    let spatial = spatial_distance(&track.centroid, &det.centroid, weights.spatial_scale);
    let appearance = match (track.embedding, det.embedding) {
        (Some(a), Some(b)) => 1.0 - cosine_similarity(a.view(), b.view()),
        _ => 1.0,
    };
    (1.0 - weights.feature_weight) * spatial + weights.feature_weight * appearance
}

/// Cost matrix with tracks as rows and detections as columns.
pub fn cost_matrix(
    tracks: &[CostInput<'_>],
    dets: &[CostInput<'_>],
    weights: CostWeights,
) -> Array2<f32> {
    let mut costs = Array2::zeros((tracks.len(), dets.len()));
    for (i, t) in tracks.iter().enumerate() {
        for (j, d) in dets.iter().enumerate() {
            costs[[i, j]] = fused_cost(t, d, weights);
        }
    }
    costs
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

impl AssignmentResult {
    fn from_matches(matches: Vec<(usize, usize)>, num_rows: usize, num_cols: usize) -> Self {
        let mut row_used = vec![false; num_rows];
        let mut col_used = vec![false; num_cols];
        for &(r, c) in &matches {
            row_used[r] = true;
            col_used[c] = true;
        }
        Self {
            matches,
            unmatched_tracks: (0..num_rows).filter(|&r| !row_used[r]).collect(),
            unmatched_detections: (0..num_cols).filter(|&c| !col_used[c]).collect(),
        }
    }
}

/// Solve the assignment with the given strategy, rejecting pairs whose
/// cost exceeds `max_cost`.
pub fn assign(
    cost_matrix: &Array2<f32>,
    max_cost: f32,
    strategy: AssignmentStrategy,
) -> AssignmentResult {
    match strategy {
        AssignmentStrategy::Greedy => greedy_assignment(cost_matrix, max_cost),
        AssignmentStrategy::Optimal => linear_assignment(cost_matrix, max_cost),
    }
}

/// Greedy nearest-cost assignment.
///
/// Rows are visited in ascending order of their minimum cost; the sort is
/// stable, so rows with equal minima keep their row order. Each row only
/// considers its own arg-min column (the lowest index among equal minima)
/// and is skipped if that column is already taken or the cost exceeds
/// `max_cost`.
pub fn greedy_assignment(cost_matrix: &Array2<f32>, max_cost: f32) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();
    if num_rows == 0 || num_cols == 0 {
        return AssignmentResult::from_matches(vec![], num_rows, num_cols);
    }

    let best: Vec<(usize, f32)> = cost_matrix
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::INFINITY), |(bj, bc), (j, &c)| {
                    if c < bc { (j, c) } else { (bj, bc) }
                })
        })
        .collect();

    let mut order: Vec<usize> = (0..num_rows).collect();
    order.sort_by(|&a, &b| best[a].1.total_cmp(&best[b].1));

    let mut col_used = vec![false; num_cols];
    let mut matches = Vec::new();
    for row in order {
        let (col, cost) = best[row];
        if col_used[col] {
            continue;
        }
        if cost > max_cost {
            log::trace!("greedy: row {row} col {col} rejected at cost {cost:.3}");
            continue;
        }
        col_used[col] = true;
        matches.push((row, col));
    }

    AssignmentResult::from_matches(matches, num_rows, num_cols)
}

/// Minimum total cost assignment using the Jonker-Volgenant solver.
pub fn linear_assignment(cost_matrix: &Array2<f32>, max_cost: f32) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();
    if num_rows == 0 || num_cols == 0 {
        return AssignmentResult::from_matches(vec![], num_rows, num_cols);
    }

    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), 1e6);
    for i in 0..num_rows {
        for j in 0..num_cols {
            padded[[i, j]] = cost_matrix[[i, j]] as f64;
        }
    }

    let mut matches = Vec::new();
    match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => {
            for (row, &col) in row_to_col.iter().enumerate().take(num_rows) {
                if col < num_cols && cost_matrix[[row, col]] <= max_cost {
                    matches.push((row, col));
                }
            }
        }
        Err(err) => {
            log::warn!("optimal assignment failed, leaving all pairs unmatched: {err:?}");
        }
    }

    AssignmentResult::from_matches(matches, num_rows, num_cols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    const WEIGHTS: CostWeights = CostWeights {
        feature_weight: 0.5,
        spatial_scale: 500.0,
    };

    #[test]
    fn test_fused_cost_without_features() {
        let t = CostInput {
            centroid: Point2::new(0.0, 0.0),
            embedding: None,
        };
        let d = CostInput {
            centroid: Point2::new(0.0, 50.0),
            embedding: None,
        };
        // spatial 0.1, appearance 1.0
        assert!((fused_cost(&t, &d, WEIGHTS) - 0.55).abs() < 1e-6);
    }

    #[test]
    fn test_fused_cost_with_features() {
        let e = array![1.0_f32, 0.0, 0.0];
        let t = CostInput {
            centroid: Point2::new(0.0, 0.0),
            embedding: Some(&e),
        };
        let d = CostInput {
            centroid: Point2::new(0.0, 0.0),
            embedding: Some(&e),
        };
        assert!(fused_cost(&t, &d, WEIGHTS).abs() < 1e-6);
    }

    #[test]
    fn test_greedy_basic() {
        let costs = array![[0.1_f32, 0.9], [0.7, 0.2]];
        let res = greedy_assignment(&costs, 0.8);
        assert_eq!(res.matches, vec![(0, 0), (1, 1)]);
        assert!(res.unmatched_tracks.is_empty());
        assert!(res.unmatched_detections.is_empty());
    }

    #[test]
    fn test_greedy_rejects_expensive_pairs() {
        let costs = array![[0.85_f32], [0.8]];
        let res = greedy_assignment(&costs, 0.8);
        // 0.8 is not above the limit, 0.85 is
        assert_eq!(res.matches, vec![(1, 0)]);
        assert_eq!(res.unmatched_tracks, vec![0]);
    }

    #[test]
    fn test_greedy_row_loses_its_only_column() {
        // Both rows prefer column 0; row 0 gets it, row 1 does not fall back
        // to column 1.
        let costs = array![[0.1_f32, 0.5], [0.2, 0.3]];
        let res = greedy_assignment(&costs, 0.8);
        assert_eq!(res.matches, vec![(0, 0)]);
        assert_eq!(res.unmatched_tracks, vec![1]);
        assert_eq!(res.unmatched_detections, vec![1]);
    }

    #[test]
    fn test_greedy_ties_follow_row_order() {
        let costs = array![[0.3_f32, 0.3], [0.3, 0.3]];
        let res = greedy_assignment(&costs, 0.8);
        assert_eq!(res.matches, vec![(0, 0)]);
        assert_eq!(res.unmatched_tracks, vec![1]);
    }

    #[test]
    fn test_greedy_suboptimal_where_optimal_is_not() {
        // Greedy takes (0,0) at 0.1 and strands row 1; the optimal
        // solution pairs (0,1) and (1,0).
        let costs = array![[0.1_f32, 0.2], [0.15, 0.9]];
        let greedy = greedy_assignment(&costs, 0.8);
        assert_eq!(greedy.matches, vec![(0, 0)]);

        let optimal = linear_assignment(&costs, 0.8);
        let mut m = optimal.matches.clone();
        m.sort();
        assert_eq!(m, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn test_empty_matrices() {
        let costs = Array2::<f32>::zeros((0, 3));
        let res = assign(&costs, 0.8, AssignmentStrategy::Greedy);
        assert_eq!(res.unmatched_detections, vec![0, 1, 2]);

        let costs = Array2::<f32>::zeros((2, 0));
        let res = assign(&costs, 0.8, AssignmentStrategy::Optimal);
        assert_eq!(res.unmatched_tracks, vec![0, 1]);
    }
}
