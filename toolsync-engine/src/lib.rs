//! # toolsync-engine
//!
//! Reconciliation engine: normalizes per-tool snapshots, merges them into a
//! union registry, derives per-tool plans and applies them through injected
//! connectors, with rotating domain logs and diagnostic reports.
//!
//! [`pipeline`] strings the steps together for one cycle.

pub mod apply;
pub mod connector;
pub mod error;
pub mod fingerprint;
pub mod logs;
pub mod normalize;
pub mod pipeline;
pub mod plan;
pub mod registry;
pub mod report;

pub use apply::{apply_tool, ApplyExecutor, ApplySummary, Backoff, RetryPolicy, ThreadSleep};
pub use connector::{capture_snapshot, Connector, ConnectorError};
pub use error::EngineError;
pub use fingerprint::{snapshot_fingerprint, Fingerprint};
pub use logs::{Level, LogSink};
pub use pipeline::{apply_all, build_and_persist, take_snapshots, BuildOutcome};
pub use report::{write_report, DiagnosticReport};
