//! Nearest-neighbour distances between two interface curves.
//!
//! For every baseline point the distance to the closest deposited-layer point
//! is the local deposition thickness. Comparison points are indexed in a k-d
//! tree so the cost is O((m + n) log n) instead of O(m·n).
//!
//! Trench profiles are made of long axis-aligned runs, and a kiddo bucket
//! cannot be split when every point in it shares the split coordinate. The
//! tree is therefore built in a frame rotated by [`TREE_FRAME_ANGLE`], which
//! keeps rotation-invariant distances while spreading those runs out. Inputs
//! that still pile a full bucket onto one coordinate are scanned linearly.

use kiddo::{KdTree, SquaredEuclidean};

use crate::geometry::{Point, Polyline};

/// At or below this many comparison points a linear scan beats building a tree.
const LINEAR_SCAN_MAX: usize = 16;

/// Bucket size of [`kiddo::KdTree`].
const BUCKET_SIZE: usize = 32;

/// Rotation (radians) between the curve frame and the tree frame. Not a
/// rational multiple of a right angle, so horizontal, vertical and diagonal
/// runs all map to distinct tree coordinates.
const TREE_FRAME_ANGLE: f64 = 0.491_3;

/// Errors from [`nearest_distances`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DistanceError {
    #[error("baseline polyline is empty")]
    EmptyBaseline,
    #[error("comparison polyline is empty")]
    EmptyComparison,
}

/// Distance from each baseline point to its nearest comparison point, in the
/// x/y plane. The result has exactly `baseline.len()` entries, all `>= 0`.
pub fn nearest_distances(
    baseline: &Polyline,
    comparison: &Polyline,
) -> Result<Vec<f64>, DistanceError> {
    if baseline.is_empty() {
        return Err(DistanceError::EmptyBaseline);
    }
    if comparison.is_empty() {
        return Err(DistanceError::EmptyComparison);
    }

    let targets = distinct_planar(comparison.points());
    let frame = TreeFrame::new();
    let rotated: Vec<[f64; 2]> = targets.iter().map(|t| frame.rotate(t)).collect();

    if targets.len() <= LINEAR_SCAN_MAX || !tree_safe(&rotated) {
        return Ok(baseline
            .points()
            .iter()
            .map(|p| linear_nearest(p, &targets))
            .collect());
    }

    let mut tree: KdTree<f64, 2> = KdTree::with_capacity(rotated.len());
    for (idx, entry) in rotated.iter().enumerate() {
        tree.add(entry, idx as u64);
    }

    Ok(baseline
        .points()
        .iter()
        .map(|p| {
            let nearest = tree.nearest_one::<SquaredEuclidean>(&frame.rotate(p));
            // Measured in the curve frame so the value matches a direct scan.
            targets
                .get(nearest.item as usize)
                .map_or_else(|| linear_nearest(p, &targets), |t| p.planar_distance(t))
        })
        .collect())
}

fn linear_nearest(point: &Point, targets: &[Point]) -> f64 {
    targets
        .iter()
        .map(|t| point.planar_distance(t))
        .fold(f64::INFINITY, f64::min)
}

/// Comparison points with exact x/y duplicates removed. Duplicates never
/// change a nearest distance.
fn distinct_planar(points: &[Point]) -> Vec<Point> {
    let mut distinct = points.to_vec();
    distinct.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    distinct.dedup_by(|a, b| a.x == b.x && a.y == b.y);
    distinct
}

/// Whether every tree-frame coordinate is finite and no axis value is shared
/// by a full bucket. Under those conditions a kiddo bucket split always finds
/// a pivot.
fn tree_safe(entries: &[[f64; 2]]) -> bool {
    if entries.iter().flatten().any(|v| !v.is_finite()) {
        return false;
    }
    (0..2).all(|axis| {
        let mut column: Vec<f64> = entries.iter().map(|e| e[axis]).collect();
        column.sort_by(f64::total_cmp);
        longest_run(&column) < BUCKET_SIZE
    })
}

/// Length of the longest run of equal values in a sorted column.
fn longest_run(sorted: &[f64]) -> usize {
    let mut longest = 0;
    let mut run = 0;
    for (i, value) in sorted.iter().enumerate() {
        run = if i > 0 && sorted[i - 1] == *value { run + 1 } else { 1 };
        longest = longest.max(run);
    }
    longest
}

struct TreeFrame {
    sin: f64,
    cos: f64,
}

impl TreeFrame {
    fn new() -> Self {
        let (sin, cos) = TREE_FRAME_ANGLE.sin_cos();
        Self { sin, cos }
    }

    fn rotate(&self, point: &Point) -> [f64; 2] {
        let [x, y] = point.planar();
        [x * self.cos - y * self.sin, x * self.sin + y * self.cos]
    }
}
