//! Error types for toolsync-engine.

use std::path::PathBuf;

use thiserror::Error;

use toolsync_core::{StoreError, ToolId};

/// All errors that can abort a reconciliation step.
///
/// Connector failures during apply are *not* represented here: they are
/// retried, logged and counted, never propagated.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Failure persisting registry, plans, state or snapshots.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (log records, reports).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A persisted plan carried an action this engine does not know.
    #[error("unsupported action '{tag}' in plan for {tool}")]
    UnsupportedAction { tool: ToolId, tag: String },
}

/// Convenience constructor for [`EngineError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> EngineError {
    EngineError::Io {
        path: path.into(),
        source,
    }
}
