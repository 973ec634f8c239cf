//! Profiler Error Types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while profiling class groups
#[derive(Debug, Error)]
pub enum ProfilerError {
    /// File or directory could not be read
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File contents are not a numeric series
    #[error("Malformed data in {}: {reason}", path.display())]
    DataFormat { path: PathBuf, reason: String },

    /// A file's series length differs from the first file of its group
    #[error("Length mismatch in class {class}: {} has {actual} samples, expected {expected}", path.display())]
    LengthMismatch {
        class: String,
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    /// Class directory holds no data files
    #[error("Class group {0} contains no data files")]
    EmptyClassGroup(String),

    /// Data root does not have the expected class-per-directory layout
    #[error("Invalid data layout: {0}")]
    Layout(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl ProfilerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProfilerError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, ProfilerError>;
