use std::path::PathBuf;
use std::time::Duration;

use toolsync_core::SyncRoot;

pub const DAEMON_SOCKET: &str = "daemon.sock";

/// Per-path quiet period for filesystem events.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// How long external change triggers are ignored after the scheduler writes.
pub const SELF_SUPPRESS_WINDOW: Duration = Duration::from_secs(8);

/// The only reason eligible for the unchanged-input fast path.
pub const PERIODIC_REASON: &str = "periodic";

/// Maximum number of reasons held while a cycle is running.
pub const REASON_MAILBOX_CAPACITY: usize = 32;

pub fn socket_path(root: &SyncRoot) -> PathBuf {
    root.path().join(DAEMON_SOCKET)
}
