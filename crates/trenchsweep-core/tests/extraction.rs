//! Extraction and distance tests against interface files on disk.

use trenchsweep_core::fakes::{raised, trench_baseline, write_vtp};
use trenchsweep_core::{nearest_distances, InterfaceExtractor, Polyline, SweepError, VtpExtractor};

#[test]
fn test_extraction_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Interface_0_0.vtp");
    write_vtp(&path, &trench_baseline()).unwrap();

    let extractor = VtpExtractor::default();
    let first = extractor.extract(&path).unwrap();
    let second = extractor.extract(&path).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, trench_baseline());
}

#[test]
fn test_distances_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let baseline_path = dir.path().join("Interface_0_0.vtp");
    let deposited_path = dir.path().join("Interface_1_0.vtp");
    write_vtp(&baseline_path, &trench_baseline()).unwrap();
    write_vtp(&deposited_path, &raised(&trench_baseline(), 0.2)).unwrap();

    let extractor = VtpExtractor::default();
    let baseline = extractor.extract(&baseline_path).unwrap();
    let deposited = extractor.extract(&deposited_path).unwrap();

    let distances = nearest_distances(&baseline, &deposited).unwrap();
    assert_eq!(distances.len(), baseline.len());
    assert!(distances.iter().all(|d| (d - 0.2).abs() < 1e-9));
}

#[test]
fn test_identical_curves_have_zero_distance() {
    let line = Polyline::from_xy(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
    let distances = nearest_distances(&line, &line).unwrap();
    assert_eq!(distances, vec![0.0; 3]);
}

#[test]
fn test_missing_file_is_data_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = VtpExtractor::default()
        .extract(&dir.path().join("missing.vtp"))
        .unwrap_err();
    assert!(matches!(err, SweepError::DataFormat { .. }));
}

#[test]
fn test_empty_polydata_is_data_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.vtp");
    write_vtp(&path, &Polyline::default()).unwrap();
    let err = VtpExtractor::default().extract(&path).unwrap_err();
    assert!(err.to_string().contains("no points"), "{err}");
}
