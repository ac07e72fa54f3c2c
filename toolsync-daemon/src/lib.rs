//! Cycle scheduler and daemon runtime: timer + watcher + socket server.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod scheduler;

pub use error::DaemonError;
pub use protocol::{
    request_cycle, request_report, request_status, request_stop, send_request, DaemonRequest,
    DaemonResponse,
};
pub use runtime::{outcome_payload, run, start_blocking};
pub use scheduler::{ControllerStatus, CycleController, CycleOutcome, CycleReport};
