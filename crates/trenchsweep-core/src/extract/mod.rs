//! Polyline extraction from simulator interface files.
//!
//! # Modules
//!
//! - [`vtp`]: VTK XML PolyData reader (points + line cells)
//! - [`stitch`]: joins unordered line cells into ordered chains

pub mod stitch;
pub mod vtp;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SweepError};
use crate::geometry::Polyline;

/// What to do when an interface file holds more than one disconnected curve.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChainSelection {
    /// Exactly one curve is expected; anything else is a data-format error.
    #[default]
    Single,
    /// Keep the curve with the most points and drop the rest.
    Longest,
}

/// Turns one interface output file into a single ordered polyline.
pub trait InterfaceExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Polyline>;
}

/// Extractor for the `.vtp` interface files the simulator writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct VtpExtractor {
    pub chains: ChainSelection,
}

impl VtpExtractor {
    pub fn new(chains: ChainSelection) -> Self {
        Self { chains }
    }
}

impl InterfaceExtractor for VtpExtractor {
    fn extract(&self, path: &Path) -> Result<Polyline> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SweepError::data_format(path, format!("cannot read file: {e}")))?;
        extract_polyline(path, &content, self.chains)
    }
}

/// Parse `content` (the text of `path`) and stitch it into one polyline.
pub fn extract_polyline(path: &Path, content: &str, chains: ChainSelection) -> Result<Polyline> {
    let mesh = vtp::parse_vtp(content).map_err(|reason| SweepError::data_format(path, reason))?;
    if mesh.points.is_empty() {
        return Err(SweepError::data_format(path, "file contains no points"));
    }

    let mut found =
        stitch::stitch(&mesh).map_err(|reason| SweepError::data_format(path, reason))?;
    debug!(
        path = %path.display(),
        points = mesh.points.len(),
        cells = mesh.cells.len(),
        chains = found.len(),
        "stitched interface"
    );

    let chain = match (chains, found.len()) {
        (_, 1) => found.remove(0),
        (ChainSelection::Single, n) => {
            return Err(SweepError::data_format(
                path,
                format!("expected one connected interface curve, found {n}"),
            ))
        }
        (ChainSelection::Longest, _) => {
            // Ties go to the chain found first.
            let mut best = 0;
            for (i, c) in found.iter().enumerate() {
                if c.points.len() > found[best].points.len() {
                    best = i;
                }
            }
            found.swap_remove(best)
        }
    };

    Ok(Polyline::new(chain.points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    fn doc(points: &str, connectivity: &str, offsets: &str) -> String {
        format!(
            r#"<VTKFile type="PolyData"><PolyData><Piece>
            <Points><DataArray NumberOfComponents="3" format="ascii">{points}</DataArray></Points>
            <Lines>
              <DataArray Name="connectivity" format="ascii">{connectivity}</DataArray>
              <DataArray Name="offsets" format="ascii">{offsets}</DataArray>
            </Lines></Piece></PolyData></VTKFile>"#
        )
    }

    #[test]
    fn test_extract_orders_points() {
        let content = doc("2 0 0  0 0 0  1 0 0", "2 1 0 2", "2 4");
        let line = extract_polyline(Path::new("t.vtp"), &content, ChainSelection::Single)
            .expect("extract");
        assert_eq!(line.xs(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_empty_file_is_data_format_error() {
        let content = doc("", "", "");
        let err = extract_polyline(Path::new("t.vtp"), &content, ChainSelection::Single)
            .unwrap_err();
        assert!(matches!(err, SweepError::DataFormat { .. }));
        assert!(err.to_string().contains("no points"));
    }

    #[test]
    fn test_multiple_chains_single_policy_fails() {
        let content = doc("0 0 0  1 0 0  5 0 0  6 0 0  7 0 0", "0 1 2 3 3 4", "2 4 6");
        let err = extract_polyline(Path::new("t.vtp"), &content, ChainSelection::Single)
            .unwrap_err();
        assert!(err.to_string().contains("found 2"), "{err}");
    }

    #[test]
    fn test_multiple_chains_longest_policy() {
        let content = doc("0 0 0  1 0 0  5 0 0  6 0 0  7 0 0", "0 1 2 3 3 4", "2 4 6");
        let line = extract_polyline(Path::new("t.vtp"), &content, ChainSelection::Longest)
            .expect("extract");
        assert_eq!(line.points()[0], Point::new(5.0, 0.0, 0.0));
        assert_eq!(line.len(), 3);
    }

    #[test]
    fn test_missing_file_is_data_format_error() {
        let err = VtpExtractor::default()
            .extract(Path::new("/definitely/not/here/Interface_0_0.vtp"))
            .unwrap_err();
        assert!(matches!(err, SweepError::DataFormat { .. }));
    }

    #[test]
    fn test_chain_selection_serde() {
        let json = serde_json::to_string(&ChainSelection::Longest).expect("serialize");
        assert_eq!(json, "\"longest\"");
    }
}
