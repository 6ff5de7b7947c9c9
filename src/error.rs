//! Fatal parse errors.

use std::io;
use std::path::PathBuf;

/// Conditions that abort a parse. Everything else is recoverable and is
/// reported through [`crate::diagnostics::DiagnosticSink`] instead.
#[derive(Debug, thiserror::Error)]
pub enum KlarfError {
    #[error("KLARF file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Stream(#[from] io::Error),

    #[error("defect record at line {line} precedes any DefectRecordSpec")]
    MissingRecordSpec { line: usize },

    #[error("DefectRecordSpec declares {width} fields, at least 10 are required")]
    UnsupportedRecordSpec { width: usize },
}

impl KlarfError {
    /// Classify an error from opening or reading `path`.
    pub(crate) fn from_io(path: PathBuf, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            KlarfError::NotFound { path }
        } else {
            KlarfError::Io { path, source }
        }
    }
}

pub type Result<T> = std::result::Result<T, KlarfError>;
