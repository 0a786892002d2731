//! Reader for VTK XML PolyData (`.vtp`) files containing line cells.
//!
//! Only the pieces needed to recover interface curves are read:
//!
//! - `Piece/Points/DataArray` (point coordinates)
//! - `Piece/Lines/DataArray[@Name="connectivity"]`
//! - `Piece/Lines/DataArray[@Name="offsets"]`
//!
//! Point data, cell data, vertices, strips and polygons are skipped. Arrays
//! must use `format="ascii"`; binary and appended encodings are rejected.
//! Multiple pieces are concatenated with their point indices offset.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::geometry::Point;

/// Points plus line cells (each cell is a run of point indices).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineMesh {
    pub points: Vec<Point>,
    pub cells: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Other,
    Points,
    Lines,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayTarget {
    Points { components: usize },
    Connectivity,
    Offsets,
    Skip,
}

#[derive(Debug, Default)]
struct Piece {
    coords: Vec<f64>,
    components: usize,
    connectivity: Vec<usize>,
    offsets: Vec<usize>,
    has_points: bool,
}

/// Parse a `.vtp` document into a [`LineMesh`].
///
/// Errors are plain messages; the caller attaches the file path.
pub fn parse_vtp(content: &str) -> Result<LineMesh, String> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut mesh = LineMesh::default();
    let mut saw_polydata = false;
    let mut piece: Option<Piece> = None;
    let mut section = Section::Other;
    let mut target: Option<ArrayTarget> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"VTKFile" => check_file_type(e)?,
                b"PolyData" => saw_polydata = true,
                b"Piece" => piece = Some(Piece::default()),
                b"Points" if piece.is_some() => section = Section::Points,
                b"Lines" if piece.is_some() => section = Section::Lines,
                b"DataArray" => {
                    target = Some(array_target(e, section, piece.as_ref())?);
                    text.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"VTKFile" => check_file_type(e)?,
                b"DataArray" => {
                    // An empty array element carries no values.
                    let empty_target = array_target(e, section, piece.as_ref())?;
                    if let Some(p) = piece.as_mut() {
                        store_array(p, empty_target, "")?;
                    }
                }
                _ => {}
            },
            Ok(Event::Text(ref t)) => {
                if target.is_some() {
                    let chunk = std::str::from_utf8(t)
                        .map_err(|e| format!("invalid UTF-8 in data array: {e}"))?;
                    text.push_str(chunk);
                    text.push(' ');
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"DataArray" => {
                    if let (Some(t), Some(p)) = (target.take(), piece.as_mut()) {
                        store_array(p, t, &text)?;
                    }
                    text.clear();
                }
                b"Points" | b"Lines" => section = Section::Other,
                b"Piece" => {
                    if let Some(p) = piece.take() {
                        append_piece(&mut mesh, p)?;
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "XML parse error at byte {}: {e}",
                    reader.buffer_position()
                ))
            }
            _ => {}
        }
    }

    if !saw_polydata {
        return Err("no <PolyData> element found".to_string());
    }
    Ok(mesh)
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, String> {
    for attr in element.attributes().flatten() {
        if attr.key.local_name().as_ref() == name {
            let value = std::str::from_utf8(&attr.value)
                .map_err(|e| format!("invalid UTF-8 in attribute: {e}"))?;
            return Ok(Some(value.to_string()));
        }
    }
    Ok(None)
}

fn check_file_type(element: &BytesStart<'_>) -> Result<(), String> {
    match attribute(element, b"type")? {
        Some(t) if t != "PolyData" => Err(format!("expected a PolyData file, found type {t:?}")),
        _ => Ok(()),
    }
}

fn array_target(
    element: &BytesStart<'_>,
    section: Section,
    piece: Option<&Piece>,
) -> Result<ArrayTarget, String> {
    let target = match section {
        // Only the first array below <Points> holds coordinates.
        Section::Points if piece.is_some_and(|p| !p.has_points) => {
            let components = match attribute(element, b"NumberOfComponents")? {
                Some(raw) => raw
                    .trim()
                    .parse::<usize>()
                    .map_err(|e| format!("invalid NumberOfComponents {raw:?}: {e}"))?,
                None => 1,
            };
            if !(2..=3).contains(&components) {
                return Err(format!(
                    "point array must have 2 or 3 components, found {components}"
                ));
            }
            ArrayTarget::Points { components }
        }
        Section::Lines => match attribute(element, b"Name")?.as_deref() {
            Some("connectivity") => ArrayTarget::Connectivity,
            Some("offsets") => ArrayTarget::Offsets,
            _ => ArrayTarget::Skip,
        },
        _ => ArrayTarget::Skip,
    };

    if target != ArrayTarget::Skip {
        let format = attribute(element, b"format")?.unwrap_or_else(|| "ascii".to_string());
        if format != "ascii" {
            return Err(format!(
                "unsupported DataArray format {format:?} (only ascii is supported)"
            ));
        }
    }
    Ok(target)
}

fn store_array(piece: &mut Piece, target: ArrayTarget, text: &str) -> Result<(), String> {
    match target {
        ArrayTarget::Points { components } => {
            let mut coords = Vec::new();
            for token in text.split_whitespace() {
                let value = token
                    .parse::<f64>()
                    .map_err(|e| format!("invalid coordinate {token:?}: {e}"))?;
                if !value.is_finite() {
                    return Err(format!("non-finite coordinate {token:?}"));
                }
                coords.push(value);
            }
            if coords.len() % components != 0 {
                return Err(format!(
                    "point array length {} is not a multiple of {components}",
                    coords.len()
                ));
            }
            piece.coords = coords;
            piece.components = components;
            piece.has_points = true;
        }
        ArrayTarget::Connectivity => piece.connectivity = parse_indices(text, "connectivity")?,
        ArrayTarget::Offsets => piece.offsets = parse_indices(text, "offsets")?,
        ArrayTarget::Skip => {}
    }
    Ok(())
}

fn parse_indices(text: &str, what: &str) -> Result<Vec<usize>, String> {
    text.split_whitespace()
        .map(|token| {
            token
                .parse::<usize>()
                .map_err(|e| format!("invalid {what} entry {token:?}: {e}"))
        })
        .collect()
}

fn append_piece(mesh: &mut LineMesh, piece: Piece) -> Result<(), String> {
    let base = mesh.points.len();
    let components = piece.components.max(1);
    let point_count = piece.coords.len() / components;

    mesh.points.extend(piece.coords.chunks_exact(components).map(|c| {
        let z = if components == 3 { c[2] } else { 0.0 };
        Point::new(c[0], c[1], z)
    }));

    let mut start = 0usize;
    for &end in &piece.offsets {
        if end < start || end > piece.connectivity.len() {
            return Err(format!(
                "line offsets are not monotonic or exceed connectivity length ({end} of {})",
                piece.connectivity.len()
            ));
        }
        let cell = &piece.connectivity[start..end];
        if let Some(&bad) = cell.iter().find(|&&i| i >= point_count) {
            return Err(format!(
                "line cell references point {bad} but the piece has {point_count} points"
            ));
        }
        mesh.cells.push(cell.iter().map(|&i| i + base).collect());
        start = end;
    }
    if start != piece.connectivity.len() {
        return Err(format!(
            "{} connectivity entries are not covered by any line offset",
            piece.connectivity.len() - start
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_SEGMENTS: &str = r#"<?xml version="1.0"?>
<VTKFile type="PolyData" version="0.1" byte_order="LittleEndian">
  <PolyData>
    <Piece NumberOfPoints="3" NumberOfVerts="0" NumberOfLines="2" NumberOfStrips="0" NumberOfPolys="0">
      <PointData>
        <DataArray type="Float32" Name="Material" format="ascii">1 1 1</DataArray>
      </PointData>
      <Points>
        <DataArray type="Float32" NumberOfComponents="3" format="ascii">
          0 0 0
          1 0 0
          2 0.5 0
        </DataArray>
      </Points>
      <Lines>
        <DataArray type="Int32" Name="connectivity" format="ascii">1 2 0 1</DataArray>
        <DataArray type="Int32" Name="offsets" format="ascii">2 4</DataArray>
      </Lines>
    </Piece>
  </PolyData>
</VTKFile>
"#;

    #[test]
    fn test_parse_points_and_cells() {
        let mesh = parse_vtp(TWO_SEGMENTS).expect("parse");
        assert_eq!(mesh.points.len(), 3);
        assert_eq!(mesh.points[2], Point::new(2.0, 0.5, 0.0));
        assert_eq!(mesh.cells, vec![vec![1, 2], vec![0, 1]]);
    }

    #[test]
    fn test_point_data_arrays_are_ignored() {
        // The Material array has 3 values; treating it as coordinates would
        // fail the component check.
        let mesh = parse_vtp(TWO_SEGMENTS).expect("parse");
        assert_eq!(mesh.points[0], Point::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_binary_format_rejected() {
        let doc = TWO_SEGMENTS.replace(
            r#"NumberOfComponents="3" format="ascii""#,
            r#"NumberOfComponents="3" format="binary""#,
        );
        let err = parse_vtp(&doc).unwrap_err();
        assert!(err.contains("binary"), "{err}");
    }

    #[test]
    fn test_offsets_beyond_connectivity_rejected() {
        let doc = TWO_SEGMENTS.replace(">2 4<", ">2 7<");
        let err = parse_vtp(&doc).unwrap_err();
        assert!(err.contains("offsets"), "{err}");
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let doc = TWO_SEGMENTS.replace(">1 2 0 1<", ">1 2 0 9<");
        let err = parse_vtp(&doc).unwrap_err();
        assert!(err.contains("point 9"), "{err}");
    }

    #[test]
    fn test_non_polydata_rejected() {
        let doc = TWO_SEGMENTS.replace(r#"type="PolyData""#, r#"type="UnstructuredGrid""#);
        assert!(parse_vtp(&doc).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(parse_vtp("not xml at all").is_err());
        assert!(parse_vtp("<VTKFile><Unclosed></VTKFile>").is_err());
    }

    #[test]
    fn test_two_component_points() {
        let doc = r#"<VTKFile type="PolyData"><PolyData><Piece>
            <Points><DataArray NumberOfComponents="2" format="ascii">0 0 1 1</DataArray></Points>
            <Lines>
              <DataArray Name="connectivity" format="ascii">0 1</DataArray>
              <DataArray Name="offsets" format="ascii">2</DataArray>
            </Lines>
        </Piece></PolyData></VTKFile>"#;
        let mesh = parse_vtp(doc).expect("parse");
        assert_eq!(mesh.points, vec![Point::xy(0.0, 0.0), Point::xy(1.0, 1.0)]);
    }

    #[test]
    fn test_multiple_pieces_offset_indices() {
        let doc = r#"<VTKFile type="PolyData"><PolyData>
          <Piece><Points><DataArray NumberOfComponents="3" format="ascii">0 0 0 1 0 0</DataArray></Points>
            <Lines><DataArray Name="connectivity" format="ascii">0 1</DataArray>
                   <DataArray Name="offsets" format="ascii">2</DataArray></Lines></Piece>
          <Piece><Points><DataArray NumberOfComponents="3" format="ascii">1 0 0 2 0 0</DataArray></Points>
            <Lines><DataArray Name="connectivity" format="ascii">0 1</DataArray>
                   <DataArray Name="offsets" format="ascii">2</DataArray></Lines></Piece>
        </PolyData></VTKFile>"#;
        let mesh = parse_vtp(doc).expect("parse");
        assert_eq!(mesh.points.len(), 4);
        assert_eq!(mesh.cells, vec![vec![0, 1], vec![2, 3]]);
    }
}
