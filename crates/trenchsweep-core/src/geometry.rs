//! Points and polylines extracted from simulator interface files.

use serde::{Deserialize, Serialize};

/// A point of an interface curve. `z` is carried through but never used by
/// the thickness computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Point in the x/y plane.
    pub fn xy(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Euclidean distance in the x/y plane.
    pub fn planar_distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub(crate) fn planar(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}

/// An ordered interface curve. Adjacent points are contiguous along the curve.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<Point>,
}

impl Polyline {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Build a planar polyline from `(x, y)` pairs.
    pub fn from_xy(coords: &[(f64, f64)]) -> Self {
        Self {
            points: coords.iter().map(|&(x, y)| Point::xy(x, y)).collect(),
        }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// x coordinates in curve order.
    pub fn xs(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.x).collect()
    }

    /// y coordinates in curve order.
    pub fn ys(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y).collect()
    }

    /// Total planar length of the curve.
    pub fn arc_length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| w[0].planar_distance(&w[1]))
            .sum()
    }
}

impl From<Vec<Point>> for Polyline {
    fn from(points: Vec<Point>) -> Self {
        Self::new(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planar_distance_ignores_z() {
        let a = Point::new(0.0, 0.0, 5.0);
        let b = Point::new(3.0, 4.0, -2.0);
        assert!((a.planar_distance(&b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_polyline_axes() {
        let line = Polyline::from_xy(&[(0.0, 1.0), (2.0, 3.0)]);
        assert_eq!(line.len(), 2);
        assert_eq!(line.xs(), vec![0.0, 2.0]);
        assert_eq!(line.ys(), vec![1.0, 3.0]);
    }

    #[test]
    fn test_arc_length() {
        let line = Polyline::from_xy(&[(0.0, 0.0), (3.0, 4.0), (3.0, 5.0)]);
        assert!((line.arc_length() - 6.0).abs() < 1e-12);
        assert_eq!(Polyline::default().arc_length(), 0.0);
    }
}
