//! Joins disjoint line cells into ordered chains.
//!
//! The simulator writes an interface curve as many short line cells whose
//! storage order is not the curve order. Cells are broken into edges, points
//! at bit-identical coordinates are welded, and the resulting graph is walked
//! from its endpoints. Every vertex may have at most two neighbours.

use std::collections::{BTreeSet, HashMap};

use super::vtp::LineMesh;
use crate::geometry::Point;

/// A chain of welded vertices, in curve order.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    pub points: Vec<Point>,
    pub closed: bool,
}

/// Stitch all line cells of `mesh` into maximal contiguous chains.
///
/// Open chains are oriented so that their first point is the lexicographically
/// smaller `(x, y)` endpoint; closed loops start at their lowest vertex and
/// do not repeat it at the end. Chains are returned open-first, each group in
/// order of their starting vertex.
pub fn stitch(mesh: &LineMesh) -> Result<Vec<Chain>, String> {
    let (welded, canonical) = weld(&mesh.points);

    let mut edges = BTreeSet::new();
    for cell in &mesh.cells {
        for pair in cell.windows(2) {
            let (a, b) = (canonical[pair[0]], canonical[pair[1]]);
            if a != b {
                edges.insert((a.min(b), a.max(b)));
            }
        }
    }
    if edges.is_empty() {
        return Err("no line segments found".to_string());
    }

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); welded.len()];
    for &(a, b) in &edges {
        adjacency[a].push(b);
        adjacency[b].push(a);
    }
    if let Some((v, neighbours)) = adjacency.iter().enumerate().find(|(_, n)| n.len() > 2) {
        let p = welded[v];
        return Err(format!(
            "interface branches at ({}, {}): {} segments meet",
            p.x,
            p.y,
            neighbours.len()
        ));
    }

    let mut visited = vec![false; welded.len()];
    let mut chains = Vec::new();

    for start in 0..welded.len() {
        if adjacency[start].len() == 1 && !visited[start] {
            let indices = walk(start, &adjacency, &mut visited);
            chains.push(orient(indices.iter().map(|&i| welded[i]).collect()));
        }
    }
    for start in 0..welded.len() {
        if adjacency[start].len() == 2 && !visited[start] {
            let indices = walk(start, &adjacency, &mut visited);
            chains.push(Chain {
                points: indices.iter().map(|&i| welded[i]).collect(),
                closed: true,
            });
        }
    }

    Ok(chains)
}

/// Map every input point to a canonical index, merging identical coordinates.
fn weld(points: &[Point]) -> (Vec<Point>, Vec<usize>) {
    let mut lookup: HashMap<[u64; 3], usize> = HashMap::with_capacity(points.len());
    let mut welded = Vec::with_capacity(points.len());
    let canonical = points
        .iter()
        .map(|p| {
            // Adding 0.0 folds -0.0 into 0.0 so both weld together.
            let key = [
                (p.x + 0.0).to_bits(),
                (p.y + 0.0).to_bits(),
                (p.z + 0.0).to_bits(),
            ];
            *lookup.entry(key).or_insert_with(|| {
                welded.push(*p);
                welded.len() - 1
            })
        })
        .collect();
    (welded, canonical)
}

fn walk(start: usize, adjacency: &[Vec<usize>], visited: &mut [bool]) -> Vec<usize> {
    let mut order = vec![start];
    visited[start] = true;
    let mut previous = None;
    let mut current = start;

    loop {
        let next = adjacency[current]
            .iter()
            .copied()
            .find(|&n| Some(n) != previous && !visited[n]);
        let Some(next) = next else { break };
        visited[next] = true;
        order.push(next);
        previous = Some(current);
        current = next;
    }
    order
}

fn orient(mut points: Vec<Point>) -> Chain {
    if let (Some(first), Some(last)) = (points.first(), points.last()) {
        if (last.x, last.y) < (first.x, first.y) {
            points.reverse();
        }
    }
    Chain {
        points,
        closed: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh(points: &[(f64, f64)], cells: &[&[usize]]) -> LineMesh {
        LineMesh {
            points: points.iter().map(|&(x, y)| Point::xy(x, y)).collect(),
            cells: cells.iter().map(|c| c.to_vec()).collect(),
        }
    }

    fn xs(chain: &Chain) -> Vec<f64> {
        chain.points.iter().map(|p| p.x).collect()
    }

    #[test]
    fn test_shuffled_segments_form_one_chain() {
        let m = mesh(
            &[(3.0, 0.0), (0.0, 0.0), (2.0, 0.0), (1.0, 0.0)],
            &[&[2, 0], &[1, 3], &[3, 2]],
        );
        let chains = stitch(&m).expect("stitch");
        assert_eq!(chains.len(), 1);
        assert_eq!(xs(&chains[0]), vec![0.0, 1.0, 2.0, 3.0]);
        assert!(!chains[0].closed);
    }

    #[test]
    fn test_duplicate_points_are_welded() {
        // Each segment owns its own copy of the shared endpoint.
        let m = mesh(
            &[(0.0, 0.0), (1.0, 0.0), (1.0, 0.0), (2.0, 1.0)],
            &[&[2, 3], &[0, 1]],
        );
        let chains = stitch(&m).expect("stitch");
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].points.len(), 3);
    }

    #[test]
    fn test_negative_zero_welds_with_zero() {
        let m = mesh(&[(0.0, 1.0), (-0.0, 1.0), (1.0, 1.0), (-1.0, 1.0)], &[
            &[3, 0],
            &[1, 2],
        ]);
        let chains = stitch(&m).expect("stitch");
        assert_eq!(chains.len(), 1);
        assert_eq!(xs(&chains[0]), vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_orientation_starts_at_smaller_x() {
        let m = mesh(&[(5.0, 0.0), (4.0, -1.0), (-2.0, 0.0)], &[&[0, 1, 2]]);
        let chains = stitch(&m).expect("stitch");
        assert_eq!(xs(&chains[0]), vec![-2.0, 4.0, 5.0]);
    }

    #[test]
    fn test_repeated_and_degenerate_edges_ignored() {
        let m = mesh(&[(0.0, 0.0), (1.0, 0.0)], &[&[0, 1], &[1, 0], &[1, 1]]);
        let chains = stitch(&m).expect("stitch");
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].points.len(), 2);
    }

    #[test]
    fn test_disconnected_chains_reported_separately() {
        let m = mesh(
            &[(0.0, 0.0), (1.0, 0.0), (5.0, 0.0), (6.0, 0.0), (7.0, 0.0)],
            &[&[0, 1], &[2, 3], &[3, 4]],
        );
        let chains = stitch(&m).expect("stitch");
        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].points.len(), 2);
        assert_eq!(chains[1].points.len(), 3);
    }

    #[test]
    fn test_closed_loop() {
        let m = mesh(
            &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)],
            &[&[0, 1], &[1, 2], &[2, 3], &[3, 0]],
        );
        let chains = stitch(&m).expect("stitch");
        assert_eq!(chains.len(), 1);
        assert!(chains[0].closed);
        assert_eq!(chains[0].points.len(), 4);
        assert_eq!(chains[0].points[0], Point::xy(0.0, 0.0));
    }

    #[test]
    fn test_branching_rejected() {
        let m = mesh(
            &[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (1.0, 1.0)],
            &[&[0, 1], &[1, 2], &[1, 3]],
        );
        let err = stitch(&m).unwrap_err();
        assert!(err.contains("branches"), "{err}");
    }

    #[test]
    fn test_no_segments_rejected() {
        let m = mesh(&[(0.0, 0.0)], &[]);
        assert!(stitch(&m).is_err());
    }
}
