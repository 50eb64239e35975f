//! # Error Types
//!
//! All fallible library operations return [`CfResult`]. The variants mirror the
//! failure classes a caller can act on: bad projection metadata, out-of-range
//! time or space queries, missing variables and degenerate numeric input.
//! Storage and serialization failures are wrapped so that `?` works across
//! module boundaries.

use thiserror::Error;

pub type CfResult<T> = Result<T, CfError>;

#[derive(Debug, Error)]
pub enum CfError {
    #[error("unsupported projection kind: {0}")]
    UnsupportedProjectionKind(String),

    #[error("invalid projection parameters: {0}")]
    InvalidProjectionParameters(String),

    #[error("projection backend failure: {0}")]
    Projection(String),

    #[error("time {time} outside of time axis [{first}, {last}]")]
    TimeOutOfRange { time: f64, first: f64, last: f64 },

    #[error("file does not contain time slice {index} (time axis has {len} entries)")]
    TimeSliceOutOfRange { index: usize, len: usize },

    #[error("point ({x}, {y}) outside grid")]
    PointOutsideGrid { x: f64, y: f64 },

    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    #[error("variable '{variable}' requires '{requires}'")]
    MissingDependency { variable: String, requires: String },

    #[error("variable '{0}' is not 3D")]
    NotA3DVariable(String),

    #[error("invalid profile input: {0}")]
    InvalidProfileInput(String),

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("missing attribute '{attribute}' on '{owner}'")]
    MissingAttribute { owner: String, attribute: String },

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    NetCdf(#[from] netcdf::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Polars(#[from] polars::prelude::PolarsError),
}

impl From<serde_json::Error> for CfError {
    fn from(err: serde_json::Error) -> Self {
        CfError::Config(err.to_string())
    }
}

impl From<serde_yaml::Error> for CfError {
    fn from(err: serde_yaml::Error) -> Self {
        CfError::Config(err.to_string())
    }
}
