//! Atomic JSON persistence for everything under the sync root.
//!
//! # Write flow
//!
//! serialize → `<name>.tmp` sibling → `rename`. The temp file always lives in
//! the target's directory so the rename never crosses filesystems.
//!
//! # Read flow
//!
//! [`read_json`] returns a [`ParseError`] describing *why* a document is not
//! usable. Callers that follow the lenient contract fall back to defaults
//! and never propagate the error.

use std::io::ErrorKind;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{io_err, ParseError, StoreError};

/// Read and deserialize `path`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ParseError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(ParseError::Missing {
                path: path.to_path_buf(),
            })
        }
        Err(err) => {
            return Err(ParseError::Io {
                path: path.to_path_buf(),
                source: err,
            })
        }
    };
    serde_json::from_str(&contents).map_err(|source| ParseError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Read `path` as an untyped JSON value.
pub fn read_value(path: &Path) -> Result<Value, ParseError> {
    read_json::<Value>(path)
}

/// Atomically write `value` as pretty JSON to `path`, creating parent dirs.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let tmp = path.with_file_name(format!("{file_name}.tmp"));
    std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}
