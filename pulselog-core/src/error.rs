//! Error types for pulselog-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from validating control input or touching the
/// log directory.
#[derive(Debug, Error)]
pub enum PulseError {
    /// Interval text was not an unsigned decimal integer that fits in `u32`.
    #[error("invalid interval {input:?}: expected an unsigned number of seconds")]
    InvalidInterval { input: String },

    /// Filename was empty after stripping the trailing line break.
    #[error("filename must not be empty")]
    EmptyFilename,

    /// Filename exceeds the path-segment limit.
    #[error("filename is {len} bytes long; the limit is {max}")]
    FilenameTooLong { len: usize, max: usize },

    /// Filename contains a path separator.
    #[error("filename must not contain '/': {name:?}")]
    FilenameSeparator { name: String },

    /// Filename contains a NUL byte and cannot be passed to `openat(2)`.
    #[error("filename must not contain NUL bytes")]
    FilenameNul,

    /// `.` and `..` name directories, never a log file.
    #[error("filename {name:?} is reserved")]
    ReservedFilename { name: String },

    /// The attribute exists but cannot be written.
    #[error("attribute '{0}' is read-only")]
    ReadOnlyAttribute(&'static str),

    /// No attribute with this name.
    #[error("unknown attribute '{0}'")]
    UnknownAttribute(String),

    /// The log directory path exists but is something else.
    #[error("{path} exists but is not a directory")]
    NotADirectory { path: PathBuf },

    /// Underlying I/O failure (permission denied, disk full, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PulseError {
    /// True for input rejected before any state was touched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PulseError::InvalidInterval { .. }
                | PulseError::EmptyFilename
                | PulseError::FilenameTooLong { .. }
                | PulseError::FilenameSeparator { .. }
                | PulseError::FilenameNul
                | PulseError::ReservedFilename { .. }
                | PulseError::ReadOnlyAttribute(_)
                | PulseError::UnknownAttribute(_)
        )
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> PulseError {
    PulseError::Io {
        path: path.into(),
        source,
    }
}
