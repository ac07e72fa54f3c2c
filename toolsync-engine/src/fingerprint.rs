//! Change detection for the scheduler's fast path.
//!
//! A [`Fingerprint`] maps every snapshot file (plus `config.json`) to the
//! SHA-256 of its bytes. Two equal fingerprints mean no connector, local or
//! external, has written anything since the previous cycle.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;

use sha2::{Digest, Sha256};

use toolsync_core::SyncRoot;

use crate::error::{io_err, EngineError};

/// Relative file name → SHA-256 hex digest.
pub type Fingerprint = BTreeMap<String, String>;

/// Hash the config file and every `snapshots/*.json` under `root`.
pub fn snapshot_fingerprint(root: &SyncRoot) -> Result<Fingerprint, EngineError> {
    let mut fingerprint = Fingerprint::new();
    if let Some(digest) = hash_file(&root.config_path())? {
        fingerprint.insert("config.json".to_string(), digest);
    }
    for tool in root.snapshot_tools_on_disk()? {
        let path = root.snapshot_path(&tool);
        if let Some(digest) = hash_file(&path)? {
            fingerprint.insert(format!("snapshots/{}.json", tool.file_stem()), digest);
        }
    }
    Ok(fingerprint)
}

/// SHA-256 hex digest of `path`, or `None` if it does not exist.
pub fn hash_file(path: &Path) -> Result<Option<String>, EngineError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(hash_bytes(&bytes))),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}
