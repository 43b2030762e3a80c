//! Single-flight, rate-limited, cancellable capture runs.
//!
//! [`CaptureOrchestrator`] admits at most one run at a time and executes it on
//! a dedicated thread so callers never block for the duration of a physical
//! capture. Admission state lives in one slot behind one mutex: the active
//! run's cancel handle and the start time of the most recent run.
//!
//! When a run ends the slot is cleared before its terminal [`StatusEvent`] is
//! published, so anyone reacting to that event can immediately start the
//! next run (subject to the cool-down).

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::cancellation::{CancelSource, CancelToken};
use crate::capture::{CaptureError, CaptureSummary};
use crate::config::CaptureOverrides;
use crate::status::{StatusBroadcaster, StatusEvent, StatusSubscription};

/// Minimum time between two run starts unless configured otherwise.
pub const DEFAULT_MIN_CAPTURE_INTERVAL: Duration = Duration::from_secs(5);

/// Terminal message for a successful run.
pub const MSG_COMPLETE: &str = "Sequence complete";

/// Terminal message for a cancelled run.
pub const MSG_CANCELLED: &str = "Capture cancelled by user";

/// Executes one complete capture run on the calling thread.
pub trait CaptureRunner: Send + Sync {
    fn run(
        &self,
        overrides: &CaptureOverrides,
        cancel: &CancelToken,
    ) -> Result<CaptureSummary, CaptureError>;
}

/// Why a start request was refused. No run is started and nothing is published.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdmissionRejection {
    #[error("capture already in progress")]
    AlreadyRunning,

    #[error("please wait {:.0}s between captures", .remaining.as_secs_f64().ceil())]
    RateLimited { remaining: Duration },

    #[error("capture not configured (camera or motors unavailable)")]
    NotConfigured,

    #[error("failed to start capture thread: {0}")]
    Spawn(String),
}

/// Why a cancel request was refused
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelRejection {
    #[error("no capture in progress")]
    NoRunInProgress,
}

struct ActiveRun {
    id: u64,
    cancel: CancelSource,
}

#[derive(Default)]
struct RunSlot {
    active: Option<ActiveRun>,
    last_start: Option<Instant>,
    next_id: u64,
}

struct OrchestratorInner {
    runner: Option<Arc<dyn CaptureRunner>>,
    status: StatusBroadcaster,
    min_interval: Duration,
    slot: Mutex<RunSlot>,
}

impl OrchestratorInner {
    fn slot(&self) -> MutexGuard<'_, RunSlot> {
        // A panicking holder must not wedge admission
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn execute(
        &self,
        id: u64,
        runner: Arc<dyn CaptureRunner>,
        overrides: CaptureOverrides,
        cancel: CancelToken,
    ) {
        info!("capture run {id} started");
        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| runner.run(&overrides, &cancel)));

        let event = match result {
            Ok(Ok(summary)) => {
                info!(
                    "capture run {id} complete: {} shots ({}x{}) in {:.1}s",
                    summary.shots,
                    summary.columns,
                    summary.rows,
                    started.elapsed().as_secs_f64()
                );
                StatusEvent::info(MSG_COMPLETE)
            }
            Ok(Err(e)) if e.is_cancelled() => {
                warn!("capture run {id}: {e}");
                StatusEvent::warning(MSG_CANCELLED)
            }
            Ok(Err(e)) => {
                error!("capture run {id} failed: {e}");
                StatusEvent::error(format!("Capture failed: {e}"))
            }
            Err(_) => {
                error!("capture run {id} panicked");
                StatusEvent::error("Capture failed: capture thread panicked")
            }
        };

        {
            let mut slot = self.slot();
            if slot.active.as_ref().is_some_and(|run| run.id == id) {
                slot.active = None;
            }
        }
        self.status.publish(event);
    }
}

/// Admission, cancellation and status fan-out for capture runs.
#[derive(Clone)]
pub struct CaptureOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl CaptureOrchestrator {
    /// `runner` is `None` when the rig could not be initialised; every start
    /// request is then refused with [`AdmissionRejection::NotConfigured`].
    pub fn new(
        runner: Option<Arc<dyn CaptureRunner>>,
        status: StatusBroadcaster,
        min_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                runner,
                status,
                min_interval,
                slot: Mutex::new(RunSlot::default()),
            }),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.runner.is_some()
    }

    /// Start a run in the background and return its id.
    ///
    /// A rejection leaves both the active run and the cool-down untouched.
    pub fn start_run(&self, overrides: CaptureOverrides) -> Result<u64, AdmissionRejection> {
        let runner = self
            .inner
            .runner
            .clone()
            .ok_or(AdmissionRejection::NotConfigured)?;

        let (id, token, previous_start) = {
            let mut slot = self.inner.slot();
            if slot.active.is_some() {
                return Err(AdmissionRejection::AlreadyRunning);
            }
            let now = Instant::now();
            if let Some(last) = slot.last_start {
                let elapsed = now.saturating_duration_since(last);
                if elapsed < self.inner.min_interval {
                    return Err(AdmissionRejection::RateLimited {
                        remaining: self.inner.min_interval - elapsed,
                    });
                }
            }

            let id = slot.next_id;
            slot.next_id += 1;
            let cancel = CancelSource::new();
            let token = cancel.token();
            slot.active = Some(ActiveRun { id, cancel });
            let previous_start = slot.last_start.replace(now);
            (id, token, previous_start)
        };

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name(format!("capture-run-{id}"))
            .spawn(move || inner.execute(id, runner, overrides, token));

        if let Err(e) = spawned {
            let mut slot = self.inner.slot();
            slot.active = None;
            slot.last_start = previous_start;
            return Err(AdmissionRejection::Spawn(e.to_string()));
        }

        Ok(id)
    }

    /// Ask the active run to stop at its next grid boundary.
    pub fn cancel_run(&self) -> Result<(), CancelRejection> {
        let slot = self.inner.slot();
        let run = slot.active.as_ref().ok_or(CancelRejection::NoRunInProgress)?;
        run.cancel.cancel();
        info!("cancellation requested for capture run {}", run.id);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner.slot().active.is_some()
    }

    /// Follow status events from now on.
    pub fn subscribe(&self) -> StatusSubscription {
        self.inner.status.subscribe()
    }

    pub fn status(&self) -> &StatusBroadcaster {
        &self.inner.status
    }

    pub fn min_interval(&self) -> Duration {
        self.inner.min_interval
    }
}
