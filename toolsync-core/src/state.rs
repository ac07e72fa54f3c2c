//! `state.json`: revision counter persisted apart from the registry.

use crate::error::{ParseError, StoreError};
use crate::layout::SyncRoot;
use crate::store;
use crate::types::RevisionState;

pub fn load_state_checked(root: &SyncRoot) -> Result<RevisionState, ParseError> {
    store::read_json(&root.state_path())
}

/// Load `state.json`; missing or malformed state starts at revision 0.
pub fn load_state(root: &SyncRoot) -> RevisionState {
    load_state_checked(root).unwrap_or_default()
}

pub fn save_state(root: &SyncRoot, state: &RevisionState) -> Result<(), StoreError> {
    store::write_json_atomic(&root.state_path(), state)
}
