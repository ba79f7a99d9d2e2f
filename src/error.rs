//! Error taxonomy for the replay/decoding pipeline.
//!
//! Only *contract violations* are errors.  Data insufficiency (too few
//! active neurons, no SWRs in a phase, empty replay sets) is reported through
//! NaN / empty / `None` sentinels and never reaches this type.
use std::path::PathBuf;
use thiserror::Error;

/// Fatal, per-session failure.
#[derive(Debug, Error)]
pub enum Error {
    /// An input array or file does not satisfy its data contract.
    #[error("malformed {what}: {reason}")]
    MalformedInput { what: String, reason: String },

    /// Tuning curves compared together have different bin counts.
    #[error("tuning-curve bin mismatch: expected {expected} bins, got {got}")]
    BinMismatch { expected: usize, got: usize },

    /// Session metadata lists the wrong number of task phases.
    #[error("expected {expected} phase epochs, got {got}")]
    UnexpectedPhaseCount { expected: usize, got: usize },

    /// A downstream stage asked for an artifact nobody produced.
    #[error("artifact '{name}' for session '{session}' has not been produced")]
    MissingArtifact { session: String, name: String },

    /// A second producer tried to write an existing artifact.
    #[error("artifact '{name}' for session '{session}' already exists")]
    ArtifactExists { session: String, name: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

impl Error {
    pub(crate) fn malformed(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedInput { what: what.into(), reason: reason.into() }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
