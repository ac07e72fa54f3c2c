//! Cycle scheduler: single-flight reconciliation with reason coalescing.
//!
//! [`CycleController`] is the only place cycles are started. Concurrent
//! callers never run a second cycle; their reasons go into a bounded mailbox
//! and are drained as one `queued:<r1,r2,...>` cycle before the running call
//! returns.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;

use toolsync_core::{config, SyncRoot};
use toolsync_engine::{
    apply_all, build_and_persist, logs::Level, snapshot_fingerprint, take_snapshots,
    ApplySummary, Backoff, Connector, Fingerprint, LogSink, ThreadSleep,
};

use crate::error::DaemonError;
use crate::paths::{PERIODIC_REASON, REASON_MAILBOX_CAPACITY, SELF_SUPPRESS_WINDOW};

const SOURCE: &str = "scheduler";

/// Summary of one completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub reason: String,
    pub revision: u64,
    pub actions: BTreeMap<String, usize>,
    pub applied: Vec<ApplySummary>,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Periodic trigger with unchanged inputs; nothing rebuilt.
    Skipped,
    /// Another cycle was running; the reason joined the mailbox.
    Queued,
    /// External change ignored inside the self-suppression window.
    Suppressed,
}

/// Point-in-time view of the controller, served by the daemon `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub running: bool,
    pub queued: Vec<String>,
    pub dropped_reasons: u64,
    pub suppressed: bool,
    pub cycles_completed: u64,
    pub last_report: Option<CycleReport>,
}

#[derive(Default)]
struct ControllerState {
    running: bool,
    queued: Vec<String>,
    dropped: u64,
    suppress_until: Option<Instant>,
    last_fingerprint: Option<Fingerprint>,
    last_report: Option<CycleReport>,
    cycles_completed: u64,
}

struct Inner {
    root: SyncRoot,
    connectors: Vec<Arc<dyn Connector>>,
    backoff: Arc<dyn Backoff + Send + Sync>,
    suppress_window: Duration,
    state: Mutex<ControllerState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Owns all scheduler state. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CycleController {
    inner: Arc<Inner>,
}

/// Holds the running flag for one `run_cycle` call.
///
/// The flag is released exactly once: by [`next_or_release`] when the mailbox
/// is empty, or by `Drop` if the call unwinds first. After a release the guard
/// never touches the flag again, since another caller may own it by then.
///
/// [`next_or_release`]: RunningGuard::next_or_release
struct RunningGuard<'a> {
    inner: &'a Inner,
    armed: bool,
}

impl RunningGuard<'_> {
    /// Next coalesced reason, or release the flag when nothing is queued.
    fn next_or_release(&mut self) -> Option<String> {
        let mut state = lock(&self.inner.state);
        if state.queued.is_empty() {
            state.running = false;
            self.armed = false;
            return None;
        }
        let reasons: Vec<String> = state.queued.drain(..).collect();
        Some(format!("queued:{}", reasons.join(",")))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(&self.inner.state).running = false;
        }
    }
}

impl Inner {
    /// Take the running flag, or queue `reason` behind the current cycle.
    fn begin(&self, reason: &str) -> Option<RunningGuard<'_>> {
        let mut state = lock(&self.state);
        if state.running {
            if state.queued.len() < REASON_MAILBOX_CAPACITY {
                state.queued.push(reason.to_string());
            } else {
                state.dropped += 1;
                tracing::warn!(reason, dropped = state.dropped, "reason mailbox full");
            }
            return None;
        }
        state.running = true;
        Some(RunningGuard {
            inner: self,
            armed: true,
        })
    }
}

impl CycleController {
    pub fn new(root: SyncRoot, connectors: Vec<Arc<dyn Connector>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                root,
                connectors,
                backoff: Arc::new(ThreadSleep),
                suppress_window: SELF_SUPPRESS_WINDOW,
                state: Mutex::new(ControllerState::default()),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Builder-style overrides, only usable before the controller is shared.
    pub fn with_backoff(self, backoff: Arc<dyn Backoff + Send + Sync>) -> Self {
        self.rebuild(|inner| inner.backoff = backoff)
    }

    pub fn with_suppress_window(self, window: Duration) -> Self {
        self.rebuild(|inner| inner.suppress_window = window)
    }

    fn rebuild(self, f: impl FnOnce(&mut Inner)) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                f(&mut inner);
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(shared) => {
                tracing::warn!("controller already shared; override ignored");
                Self { inner: shared }
            }
        }
    }

    pub fn root(&self) -> &SyncRoot {
        &self.inner.root
    }

    // -----------------------------------------------------------------------
    // Triggers
    // -----------------------------------------------------------------------

    /// Run one cycle for `reason`, or queue the reason if a cycle is running.
    ///
    /// Blocking. Reasons queued while this call runs are drained before it
    /// returns; the returned outcome is that of the first cycle.
    pub fn run_cycle(&self, reason: &str) -> Result<CycleOutcome, DaemonError> {
        let Some(mut guard) = self.inner.begin(reason) else {
            return Ok(CycleOutcome::Queued);
        };

        let first = self.cycle_once(reason);
        if let Err(err) = &first {
            self.record_failure(reason, err);
        }
        while let Some(next) = guard.next_or_release() {
            if let Err(err) = self.cycle_once(&next) {
                self.record_failure(&next, &err);
            }
        }
        first
    }

    /// Entry point for filesystem-observed changes. Ignored while the
    /// self-suppression window is open.
    pub fn notify_external_change(&self, reason: &str) -> Result<CycleOutcome, DaemonError> {
        if self.is_suppressed() {
            tracing::debug!(reason, "external change suppressed");
            return Ok(CycleOutcome::Suppressed);
        }
        self.run_cycle(reason)
    }

    /// [`run_cycle`](Self::run_cycle) on the blocking pool.
    pub async fn run_cycle_async(&self, reason: String) -> Result<CycleOutcome, DaemonError> {
        let controller = self.clone();
        tokio::task::spawn_blocking(move || controller.run_cycle(&reason))
            .await
            .map_err(|err| DaemonError::Protocol(format!("cycle task join error: {err}")))?
    }

    pub async fn notify_external_change_async(
        &self,
        reason: String,
    ) -> Result<CycleOutcome, DaemonError> {
        let controller = self.clone();
        tokio::task::spawn_blocking(move || controller.notify_external_change(&reason))
            .await
            .map_err(|err| DaemonError::Protocol(format!("cycle task join error: {err}")))?
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Spawn the periodic timer on the current tokio runtime.
    pub fn start(&self, interval: Duration) {
        let controller = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match controller.run_cycle_async(PERIODIC_REASON.to_string()).await {
                    Ok(outcome) => tracing::debug!(?outcome, "periodic cycle finished"),
                    Err(err) => tracing::error!(error = %err, "periodic cycle failed"),
                }
            }
        });
        lock(&self.inner.tasks).push(handle);
    }

    /// Abort every task spawned by [`start`](Self::start).
    pub fn stop(&self) {
        for handle in lock(&self.inner.tasks).drain(..) {
            handle.abort();
        }
    }

    pub fn has_background_tasks(&self) -> bool {
        lock(&self.inner.tasks).iter().any(|h| !h.is_finished())
    }

    pub fn status(&self) -> ControllerStatus {
        let state = lock(&self.inner.state);
        ControllerStatus {
            running: state.running,
            queued: state.queued.clone(),
            dropped_reasons: state.dropped,
            suppressed: state
                .suppress_until
                .map(|until| Instant::now() < until)
                .unwrap_or(false),
            cycles_completed: state.cycles_completed,
            last_report: state.last_report.clone(),
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.status().suppressed
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn open_suppression(&self) {
        lock(&self.inner.state).suppress_until = Some(Instant::now() + self.inner.suppress_window);
    }

    /// Pop the mailbox as one combined reason, or clear the running flag in
    /// the same critical section so no reason is lost.
    fn cycle_once(&self, reason: &str) -> Result<CycleOutcome, DaemonError> {
        let started = Instant::now();
        let root = &self.inner.root;
        root.ensure()?;
        let config = config::load_config(root);
        let sink = LogSink::new(root, &config);
        let connectors = &self.inner.connectors;

        if !connectors.is_empty() {
            self.open_suppression();
            take_snapshots(root, &config, connectors)?;
        }

        let fingerprint = snapshot_fingerprint(root)?;
        if reason == PERIODIC_REASON
            && lock(&self.inner.state).last_fingerprint.as_ref() == Some(&fingerprint)
        {
            sink.event(Level::Debug, SOURCE, format!("cycle.skipped {reason}"), None)?;
            return Ok(CycleOutcome::Skipped);
        }

        let mut build = build_and_persist(root, &config)?;
        let mut applied = Vec::new();
        if config.auto_apply && !connectors.is_empty() {
            self.open_suppression();
            applied = apply_all(root, &config, connectors, &sink, self.inner.backoff.as_ref())?;
            take_snapshots(root, &config, connectors)?;
            build = build_and_persist(root, &config)?;
        }

        let report = CycleReport {
            reason: reason.to_string(),
            revision: build.revision,
            actions: build
                .action_counts()
                .into_iter()
                .map(|(tool, n)| (tool.to_string(), n))
                .collect(),
            applied,
            duration_ms: started.elapsed().as_millis(),
        };
        sink.event(
            Level::Info,
            SOURCE,
            format!("cycle.completed {reason}"),
            Some(json!(report)),
        )?;
        tracing::info!(
            reason,
            revision = report.revision,
            duration_ms = report.duration_ms as u64,
            "cycle completed"
        );

        let fingerprint = snapshot_fingerprint(root)?;
        let mut state = lock(&self.inner.state);
        state.last_fingerprint = Some(fingerprint);
        state.last_report = Some(report.clone());
        state.cycles_completed += 1;
        Ok(CycleOutcome::Completed(report))
    }

    fn record_failure(&self, reason: &str, err: &DaemonError) {
        tracing::error!(reason, error = %err, "cycle failed");
        let root = &self.inner.root;
        let sink = LogSink::new(root, &config::load_config(root));
        if let Err(log_err) = sink.error(SOURCE, format!("cycle {reason} failed"), None, err.to_string()) {
            tracing::warn!(error = %log_err, "could not write error log");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
