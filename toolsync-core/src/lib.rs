//! toolsync core library: domain types, configuration, sync-root persistence.
//!
//! - [`types`]: snapshots, registry, plans, actions
//! - [`config`]: lenient [`ToolSyncConfig`] loading
//! - [`layout`]: [`SyncRoot`] path helpers
//! - [`store`]: atomic JSON read/write
//! - [`state`]: revision counter

pub mod config;
pub mod error;
pub mod layout;
pub mod state;
pub mod store;
pub mod types;

pub use config::ToolSyncConfig;
pub use error::{ParseError, StoreError};
pub use layout::SyncRoot;
pub use types::{
    Action, Category, EnvEntry, ItemOwners, Plan, Registry, RevisionState, Snapshot, ToolId,
    EPOCH_ISO,
};
