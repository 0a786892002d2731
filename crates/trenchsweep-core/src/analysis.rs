//! Thickness statistics from persisted sweep tables.
//!
//! Repetitions of the same (geometry, sticking probability) pair are averaged
//! point by point into a [`ThicknessProfile`]. The profile is then reduced to
//! the usual conformality figures: thickness on top of the trench, at its
//! bottom and along the left sidewall, and the step coverage bottom/top.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SweepError};
use crate::results::{read_data_table, read_geometry_table, GeometryId, GeometryRecord, RunRecord, TablePaths};

/// Vertical tolerance used to classify points as top, bottom or sidewall.
pub const DEFAULT_BAND: f64 = 0.5;

/// Element-wise mean thickness over all repetitions of one configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThicknessProfile {
    pub geometry_id: GeometryId,
    pub sticking_probability: f64,
    pub repetitions: usize,
    pub mean: Vec<f64>,
}

/// Conformality figures for one profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub geometry_id: GeometryId,
    pub sticking_probability: f64,
    pub repetitions: usize,
    /// Mean thickness within `band` of the highest baseline point.
    pub top: f64,
    /// Mean thickness within `band` of the lowest baseline point.
    pub bottom: f64,
    /// Mean thickness on the left sidewall, if the geometry has one.
    pub sidewall: Option<f64>,
    /// `bottom / top`; `None` when nothing was deposited on top.
    pub step_coverage: Option<f64>,
}

/// Average the runs of each (geometry, probability) pair, in order of first
/// appearance. `data_path` is only used to label errors.
pub fn mean_profiles(
    data_path: &Path,
    geometries: &[GeometryRecord],
    runs: &[RunRecord],
) -> Result<Vec<ThicknessProfile>> {
    let mut profiles: Vec<ThicknessProfile> = Vec::new();

    for (row, run) in runs.iter().enumerate() {
        let geometry = geometries
            .iter()
            .find(|g| g.geometry_id == run.geometry_id)
            .ok_or_else(|| {
                SweepError::data_format(
                    data_path,
                    format!("row {row}: unknown geometry_id {}", run.geometry_id),
                )
            })?;
        if run.distances.len() != geometry.len() {
            return Err(SweepError::data_format(
                data_path,
                format!(
                    "row {row}: {} distances for a geometry of {} points",
                    run.distances.len(),
                    geometry.len()
                ),
            ));
        }

        let existing = profiles.iter_mut().find(|p| {
            p.geometry_id == run.geometry_id
                && p.sticking_probability.to_bits() == run.sticking_probability.to_bits()
        });
        match existing {
            Some(profile) => {
                for (sum, d) in profile.mean.iter_mut().zip(&run.distances) {
                    *sum += d;
                }
                profile.repetitions += 1;
            }
            None => profiles.push(ThicknessProfile {
                geometry_id: run.geometry_id,
                sticking_probability: run.sticking_probability,
                repetitions: 1,
                mean: run.distances.clone(),
            }),
        }
    }

    for profile in &mut profiles {
        let n = profile.repetitions as f64;
        profile.mean.iter_mut().for_each(|v| *v /= n);
    }
    Ok(profiles)
}

fn mean_where(values: &[f64], keep: impl Fn(usize) -> bool) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .enumerate()
        .filter(|(i, _)| keep(*i))
        .fold((0.0, 0usize), |(s, c), (_, v)| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Reduce a profile to top / bottom / sidewall thickness.
///
/// Callers must pass the geometry the profile was measured on.
pub fn summarize_profile(
    geometry: &GeometryRecord,
    profile: &ThicknessProfile,
    band: f64,
) -> ProfileSummary {
    let ys = &geometry.ys;
    let xs = &geometry.xs;
    let max_y = ys.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min_y = ys.iter().copied().fold(f64::INFINITY, f64::min);

    let top = mean_where(&profile.mean, |i| ys[i] >= max_y - band).unwrap_or(0.0);
    let bottom = mean_where(&profile.mean, |i| ys[i] <= min_y + band).unwrap_or(0.0);
    let sidewall = mean_where(&profile.mean, |i| {
        xs[i] < 0.0 && ys[i] > min_y + band && ys[i] < -band
    });

    ProfileSummary {
        geometry_id: profile.geometry_id,
        sticking_probability: profile.sticking_probability,
        repetitions: profile.repetitions,
        top,
        bottom,
        sidewall,
        step_coverage: (top > 0.0).then(|| bottom / top),
    }
}

/// Read both tables of a sweep and summarise every profile.
pub fn summarize(paths: &TablePaths, band: f64) -> Result<Vec<ProfileSummary>> {
    if !(band.is_finite() && band >= 0.0) {
        return Err(SweepError::Configuration(format!(
            "band must be a non-negative number, got {band}"
        )));
    }
    let geometries = read_geometry_table(&paths.geometry)?;
    let runs = read_data_table(&paths.data)?;
    let profiles = mean_profiles(&paths.data, &geometries, &runs)?;

    Ok(profiles
        .iter()
        .filter_map(|profile| {
            geometries
                .iter()
                .find(|g| g.geometry_id == profile.geometry_id)
                .map(|g| summarize_profile(g, profile, band))
        })
        .collect())
}

/// Fixed-width text table for terminal output.
pub fn render_summary_table(summaries: &[ProfileSummary]) -> String {
    fn opt(v: Option<f64>) -> String {
        v.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"))
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>8} {:>14} {:>5} {:>10} {:>10} {:>10} {:>10}",
        "geometry", "sticking_prob", "reps", "top", "bottom", "sidewall", "coverage"
    );
    for s in summaries {
        let _ = writeln!(
            out,
            "{:>8} {:>14} {:>5} {:>10.4} {:>10.4} {:>10} {:>10}",
            s.geometry_id,
            s.sticking_probability,
            s.repetitions,
            s.top,
            s.bottom,
            opt(s.sidewall),
            opt(s.step_coverage),
        );
    }
    out
}
