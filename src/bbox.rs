//! Bounding box operations and IoU calculations

use ndarray::prelude::*;
use rayon::prelude::*;

/// Axis-aligned bounding box in corner representation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox<T = f32> {
    pub xmin: T,
    pub ymin: T,
    pub xmax: T,
    pub ymax: T,
}

impl Bbox<f32> {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Convert a center + size box into min/max corners
    pub fn from_center(x: f32, y: f32, w: f32, h: f32) -> Self {
        let half_w = w / 2.0;
        let half_h = h / 2.0;
        Self {
            xmin: x - half_w,
            ymin: y - half_h,
            xmax: x + half_w,
            ymax: y + half_h,
        }
    }

    pub fn area(&self) -> f32 {
        (self.xmax - self.xmin).max(0.0) * (self.ymax - self.ymin).max(0.0)
    }
}

/// Length of the overlap of `[a0, a1]` and `[b0, b1]`, 0 when disjoint
fn overlap(a0: f32, a1: f32, b0: f32, b1: f32) -> f32 {
    (a1.min(b1) - a0.max(b0)).max(0.0)
}

/// Intersection over union of two boxes
///
/// Disjoint boxes, boxes touching only at an edge and degenerate (zero-area)
/// boxes all yield 0.
pub fn calculate_iou(a: &Bbox<f32>, b: &Bbox<f32>) -> f32 {
    let intersection =
        overlap(a.xmin, a.xmax, b.xmin, b.xmax) * overlap(a.ymin, a.ymax, b.ymin, b.ymax);
    if intersection <= 0.0 {
        return 0.0;
    }
    let union = a.area() + b.area() - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Compute the IoU matrix between track boxes and candidate boxes
/// Returns: (n_tracks, n_candidates) IoU matrix, rows computed in parallel
pub fn iou_matrix(tracks: &[Bbox<f32>], candidates: &[Bbox<f32>]) -> Array2<f32> {
    let n_tracks = tracks.len();
    let n_candidates = candidates.len();

    if n_tracks == 0 || n_candidates == 0 {
        return Array2::zeros((n_tracks, n_candidates));
    }

    let rows: Vec<Vec<f32>> = tracks
        .par_iter()
        .map(|track_box| {
            candidates
                .iter()
                .map(|candidate| calculate_iou(track_box, candidate))
                .collect()
        })
        .collect();

    Array2::from_shape_fn((n_tracks, n_candidates), |(i, j)| rows[i][j])
}
