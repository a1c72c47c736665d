//! ---
//! ilk_section: "02-controlled-execution"
//! ilk_subsection: "module"
//! ilk_type: "source"
//! ilk_scope: "code"
//! ilk_description: "Worker thread handles and the breakpoint hand-off cell."
//! ilk_version: "v0.1.0"
//! ilk_owner: "tbd"
//! ---
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::HarnessError;

/// Observable phase of one worker thread.
///
/// `AtBreakpoint` and `Running` alternate until one of the terminal phases
/// is reached; `Failed` is reachable from any non-terminal phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerPhase {
    /// Thread spawned but the worker body has not begun.
    NotStarted,
    /// The contract's `initialize` hook is running.
    Initializing,
    /// Parked at the named breakpoint, waiting for a controller resume.
    AtBreakpoint(String),
    /// Executing the controlled call between breakpoints.
    Running,
    /// Run phase and teardown finished without error.
    Completed,
    /// An error was captured; see the handle's recorded errors.
    Failed,
}

impl WorkerPhase {
    /// Whether the phase is `Completed` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerPhase::Completed | WorkerPhase::Failed)
    }
}

#[derive(Debug)]
pub(crate) struct WorkerState {
    pub phase: WorkerPhase,
    /// Set by the controller to let the worker leave its current breakpoint.
    pub resume_pending: bool,
    /// Once set, `arrive` records nothing and never blocks again.
    pub detached: bool,
    /// Whether the controller has recorded the crossing for the breakpoint
    /// the worker is currently parked at.
    pub acknowledged: bool,
    /// Primary captured error (resolution, initialization, run phase, ...).
    pub error: Option<HarnessError>,
    /// Teardown error, retained separately so it never masks the primary.
    pub teardown_error: Option<HarnessError>,
}

/// Hand-off cell shared between one worker thread and the controller.
///
/// This is the only mutable state the two threads share: the worker parks
/// and reports phase changes through it, the controller resumes and
/// observes through it.
#[derive(Debug)]
pub(crate) struct WorkerShared {
    pub contract_id: String,
    pub state: Mutex<WorkerState>,
    /// Worker notifies the controller on every phase change.
    pub stopped: Condvar,
    /// Controller notifies the worker to continue past its breakpoint.
    pub resumed: Condvar,
}

impl WorkerShared {
    pub fn new(contract_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            contract_id: contract_id.into(),
            state: Mutex::new(WorkerState {
                phase: WorkerPhase::NotStarted,
                resume_pending: false,
                detached: false,
                acknowledged: false,
                error: None,
                teardown_error: None,
            }),
            stopped: Condvar::new(),
            resumed: Condvar::new(),
        })
    }

    pub fn set_phase(&self, phase: WorkerPhase) {
        let mut state = self.state.lock();
        state.phase = phase;
        self.stopped.notify_all();
    }

    pub fn is_detached(&self) -> bool {
        self.state.lock().detached
    }

    /// Park the calling worker at `name` until the controller resumes or
    /// detaches it. No-op once detached.
    pub fn park_at(&self, name: &str) {
        let mut state = self.state.lock();
        if state.detached {
            return;
        }
        debug!(contract = %self.contract_id, breakpoint = name, "worker parked");
        state.phase = WorkerPhase::AtBreakpoint(name.to_owned());
        state.acknowledged = false;
        self.stopped.notify_all();
        while !state.resume_pending && !state.detached {
            self.resumed.wait(&mut state);
        }
        state.resume_pending = false;
        state.phase = WorkerPhase::Running;
        debug!(contract = %self.contract_id, breakpoint = name, "worker resumed");
    }

    /// Record a fatal error and move to `Failed`. Keeps the first error if
    /// one was already captured.
    pub fn fail(&self, error: HarnessError) {
        let mut state = self.state.lock();
        warn!(contract = %self.contract_id, error = %error, "worker failed");
        state.error.get_or_insert(error);
        state.phase = WorkerPhase::Failed;
        self.stopped.notify_all();
    }

    /// Record the end of the run phase and teardown. A run-phase error is
    /// primary; a teardown error alone also fails the contract.
    pub fn complete(
        &self,
        run_error: Option<HarnessError>,
        teardown_error: Option<HarnessError>,
    ) {
        let mut state = self.state.lock();
        state.teardown_error = teardown_error.clone();
        if let Some(error) = run_error {
            state.error = Some(error);
            state.phase = WorkerPhase::Failed;
        } else if let Some(error) = teardown_error {
            state.error = Some(error);
            state.phase = WorkerPhase::Failed;
        } else {
            state.phase = WorkerPhase::Completed;
        }
        debug!(contract = %self.contract_id, phase = ?state.phase, "worker finished");
        self.stopped.notify_all();
    }

    /// Unblock the worker permanently: it runs unmanaged to completion and
    /// no further crossings are recorded.
    pub fn detach(&self) {
        let mut state = self.state.lock();
        state.detached = true;
        state.resume_pending = true;
        self.resumed.notify_one();
    }
}

/// The controller's view of one running contract's thread.
#[derive(Debug)]
pub struct WorkerHandle {
    pub(crate) shared: Arc<WorkerShared>,
    pub(crate) join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Identifier of the contract this worker executes.
    pub fn contract_id(&self) -> &str {
        &self.shared.contract_id
    }

    /// Snapshot of the worker's current phase.
    pub fn phase(&self) -> WorkerPhase {
        self.shared.state.lock().phase.clone()
    }

    /// Primary captured error, if any.
    pub fn error(&self) -> Option<HarnessError> {
        self.shared.state.lock().error.clone()
    }

    /// Captured teardown error, if any.
    pub fn teardown_error(&self) -> Option<HarnessError> {
        self.shared.state.lock().teardown_error.clone()
    }

    /// Join the underlying thread. A join failure here means the worker
    /// panicked outside the guarded lifecycle, which is only logged.
    pub(crate) fn join_thread(&mut self) {
        if let Some(handle) = self.join.take() {
            if handle.join().is_err() {
                warn!(contract = %self.shared.contract_id, "worker thread join reported panic");
            }
        }
    }
}
