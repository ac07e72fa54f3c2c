//! Error types for toolsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while writing persisted state.
///
/// Read paths never surface these: see [`ParseError`] and the lenient loaders.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure, with the path that was being touched.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (write path).
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// `dirs::home_dir()` returned `None` and no sync root was given.
    #[error("cannot determine home directory; pass --root or set TOOLSYNC_ROOT")]
    HomeNotFound,
}

/// Why a persisted JSON document could not be read.
///
/// Public loaders coerce every variant to a typed default; tests and
/// diagnostics use the `*_checked` loaders to tell "defaulted" apart from
/// "genuinely present".
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{path} does not exist")]
    Missing { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ParseError {
    pub fn is_missing(&self) -> bool {
        matches!(self, ParseError::Missing { .. })
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
