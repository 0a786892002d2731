//! Typed rendering of simulator parameter files.
//!
//! Templates use `$NAME` / `${NAME}` markers (`$$` for a literal dollar sign).
//! The set of names is closed: [`ParameterTemplate::parse`] rejects unknown
//! names and templates that leave any [`Placeholder`] unused, so a template
//! that loads successfully always renders completely.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::StickingProbability;
use crate::error::{Result, SweepError, TemplateError};

/// Parameter template bundled with the crate.
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/deposition.template");

/// The placeholders a parameter template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    GeometryFile,
    DistanceBits,
    OutputPath,
    FdScheme,
    ProcessTime,
    OutputVolume,
    DepositionRate,
    StickingProbability,
    StatisticalAccuracy,
}

impl Placeholder {
    pub const ALL: [Placeholder; 9] = [
        Placeholder::GeometryFile,
        Placeholder::DistanceBits,
        Placeholder::OutputPath,
        Placeholder::FdScheme,
        Placeholder::ProcessTime,
        Placeholder::OutputVolume,
        Placeholder::DepositionRate,
        Placeholder::StickingProbability,
        Placeholder::StatisticalAccuracy,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Placeholder::GeometryFile => "GEOMETRY_FILE",
            Placeholder::DistanceBits => "DISTANCE_BITS",
            Placeholder::OutputPath => "OUTPUT_PATH",
            Placeholder::FdScheme => "FD_SCHEME",
            Placeholder::ProcessTime => "PROCESS_TIME",
            Placeholder::OutputVolume => "OUTPUT_VOLUME",
            Placeholder::DepositionRate => "DEPOSITION_RATE",
            Placeholder::StickingProbability => "STICKING_PROBABILITY",
            Placeholder::StatisticalAccuracy => "STATISTICAL_ACCURACY",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Values for every placeholder of one simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateValues {
    pub geometry_file: PathBuf,
    pub distance_bits: u32,
    pub output_path: PathBuf,
    pub fd_scheme: String,
    pub process_time: f64,
    pub output_volume: Vec<f64>,
    pub deposition_rate: f64,
    pub sticking_probability: StickingProbability,
    pub statistical_accuracy: f64,
}

impl TemplateValues {
    /// Text substituted for `placeholder`.
    pub fn value(&self, placeholder: Placeholder) -> String {
        match placeholder {
            Placeholder::GeometryFile => path_text(&self.geometry_file),
            Placeholder::DistanceBits => self.distance_bits.to_string(),
            Placeholder::OutputPath => path_text(&self.output_path),
            Placeholder::FdScheme => self.fd_scheme.clone(),
            Placeholder::ProcessTime => self.process_time.to_string(),
            Placeholder::OutputVolume => self
                .output_volume
                .iter()
                .map(f64::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            Placeholder::DepositionRate => self.deposition_rate.to_string(),
            Placeholder::StickingProbability => self.sticking_probability.to_string(),
            Placeholder::StatisticalAccuracy => self.statistical_accuracy.to_string(),
        }
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

/// A parsed, validated parameter template.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl ParameterTemplate {
    /// Parse and validate template text.
    pub fn parse(source: &str) -> std::result::Result<Self, TemplateError> {
        let segments = tokenize(source)?;
        for placeholder in Placeholder::ALL {
            if !segments.contains(&Segment::Placeholder(placeholder)) {
                return Err(TemplateError::MissingPlaceholder {
                    name: placeholder.name(),
                });
            }
        }
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The bundled deposition template.
    pub fn builtin() -> std::result::Result<Self, TemplateError> {
        Self::parse(DEFAULT_TEMPLATE)
    }

    /// Load a template file, or the bundled template when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    SweepError::Configuration(format!(
                        "cannot read template {}: {e}",
                        path.display()
                    ))
                })?;
                Ok(Self::parse(&text)?)
            }
            None => Ok(Self::builtin()?),
        }
    }

    /// Unrendered template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Substitute every placeholder.
    pub fn render(&self, values: &TemplateValues) -> String {
        let mut out = String::with_capacity(self.source.len() + 64);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(p) => out.push_str(&values.value(*p)),
            }
        }
        out
    }
}

fn tokenize(source: &str) -> std::result::Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = source;
    let mut offset = 0usize;

    while let Some(pos) = rest.find('$') {
        literal.push_str(&rest[..pos]);
        let marker = offset + pos;
        let after = &rest[pos + 1..];

        let (placeholder, consumed) = if let Some(tail) = after.strip_prefix('$') {
            literal.push('$');
            rest = tail;
            offset = marker + 2;
            continue;
        } else if let Some(braced) = after.strip_prefix('{') {
            let end = braced
                .find('}')
                .ok_or(TemplateError::Unterminated { offset: marker })?;
            let name = &braced[..end];
            (lookup(name, marker)?, end + 2)
        } else {
            let len = after
                .char_indices()
                .find(|&(i, c)| {
                    !(c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()))
                })
                .map_or(after.len(), |(i, _)| i);
            if len == 0 {
                return Err(TemplateError::DanglingDollar { offset: marker });
            }
            (lookup(&after[..len], marker)?, len)
        };

        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Placeholder(placeholder));
        rest = &after[consumed..];
        offset = marker + 1 + consumed;
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn lookup(name: &str, offset: usize) -> std::result::Result<Placeholder, TemplateError> {
    Placeholder::from_name(name).ok_or_else(|| TemplateError::UnknownPlaceholder {
        name: name.to_string(),
        offset,
    })
}
