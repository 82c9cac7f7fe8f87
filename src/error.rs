use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Which side of the expression grid an identifier or position refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Sample,
    Feature,
    Covariate,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Sample => write!(f, "sample"),
            Axis::Feature => write!(f, "feature"),
            Axis::Covariate => write!(f, "covariate"),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error(
        "sample identifiers do not align: expression-only [{}], covariate-only [{}]",
        .expression_only.join(", "),
        .covariate_only.join(", ")
    )]
    #[diagnostic(help("covariate row identifiers must match the expression column labels"))]
    Alignment {
        expression_only: Vec<String>,
        covariate_only: Vec<String>,
    },

    #[error("feature identifier count {actual} does not match expression row count {expected}")]
    Cardinality { expected: usize, actual: usize },

    #[error("{axis} identifier not found: {id}")]
    Lookup { axis: Axis, id: String },

    #[error("{axis} position {position} out of range (len {len})")]
    PositionOutOfRange {
        axis: Axis,
        position: usize,
        len: usize,
    },

    #[error("duplicate {axis} identifier: {id}")]
    DuplicateIdentifier { axis: Axis, id: String },

    #[error("dataset has no feature identifiers")]
    MissingFeatureIds,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid GEO series accession: {0}")]
    InvalidGeoAccession(String),

    #[error("GEO request failed: {0}")]
    GeoHttp(String),

    #[error("GEO returned status {status}: {message}")]
    GeoStatus { status: u16, message: String },

    #[error("no series matrix files listed for {0}")]
    GeoNoSeriesMatrix(String),

    #[error("missing config file kira-es.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
