//! Error type shared by every stage of the pipeline.
//!
//! Errors are classified by how far they propagate: configuration errors
//! ([`CtwError::InvalidCutoff`], [`CtwError::InvalidConfig`], [`CtwError::NoInputFiles`]) abort a
//! run, while everything else is contained to the point or day that raised it and is logged.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Error type for extraction, filtering and reconstruction.
#[derive(Debug, Error)]
pub enum CtwError {
    /// A product file lacks the coordinate or value variable expected for the selected case.
    #[error("{path}: missing axis or variable `{name}`")]
    MissingAxis { path: PathBuf, name: String },

    /// Normalized band-pass cutoffs must satisfy 0 < low < high < 1.
    #[error("invalid cutoff: normalized band [{low}, {high}] must satisfy 0 < low < high < 1 (order {order})")]
    InvalidCutoff { low: f64, high: f64, order: usize },

    /// A series has no usable defined samples.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Array shapes disagree with their axes.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The filter received a sequence that still contains undefined samples.
    #[error("sequence contains {0} undefined samples; gap filling must run before filtering")]
    UndefinedSamples(usize),

    /// File I/O error
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading an `.npz` archive failed.
    #[error("reading {path}: {source}")]
    NpzRead {
        path: PathBuf,
        #[source]
        source: ndarray_npy::ReadNpzError,
    },

    /// Writing an `.npz` archive failed.
    #[error("writing {path}: {source}")]
    NpzWrite {
        path: PathBuf,
        #[source]
        source: ndarray_npy::WriteNpzError,
    },

    /// NetCDF library error
    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    /// Feature not enabled
    #[error("`{0}` support requires the `{0}` feature")]
    FeatureDisabled(&'static str),

    /// Configuration file or values are unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No snapshot file matched the case and date range.
    #[error("no input files for the requested case and date range in {0}")]
    NoInputFiles(PathBuf),

    /// The worker pool could not be created.
    #[error("thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// The run was cancelled before the task finished.
    #[error("cancelled")]
    Cancelled,

    /// The task exceeded its time budget.
    #[error("task exceeded its {0:?} time budget")]
    TimedOut(Duration),

    /// The task panicked; siblings keep running.
    #[error("task panicked: {0}")]
    TaskPanicked(String),
}

impl CtwError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CtwError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn missing_axis(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        CtwError::MissingAxis {
            path: path.into(),
            name: name.into(),
        }
    }

    /// Configuration-level errors abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CtwError::InvalidCutoff { .. }
                | CtwError::InvalidConfig(_)
                | CtwError::NoInputFiles(_)
                | CtwError::FeatureDisabled(_)
                | CtwError::ThreadPool(_)
        )
    }
}

pub type Result<T, E = CtwError> = std::result::Result<T, E>;
