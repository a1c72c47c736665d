//! ---
//! ilk_section: "02-controlled-execution"
//! ilk_subsection: "module"
//! ilk_type: "source"
//! ilk_scope: "code"
//! ilk_description: "Deterministic interleaving controller for worker threads."
//! ilk_version: "v0.1.0"
//! ilk_owner: "tbd"
//! ---
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use interlock_common::config::HarnessConfig;
use tracing::{debug, info, warn};

use crate::breakpoint::WorkerContext;
use crate::collector::{ContractOutcome, Crossing, CrossingLog};
use crate::runnable::Runnable;
use crate::worker::{WorkerHandle, WorkerPhase, WorkerShared};
use crate::{HarnessError, Result};

/// Orchestrates deterministic interleaving across one or more worker
/// threads, one per runnable contract.
///
/// The controller runs on the test's thread. Workers only make progress
/// when the controller resumes them, so the realized interleaving is
/// exactly the order of `step_to`/`finish` calls.
#[derive(Debug)]
pub struct ThreadController {
    step_timeout: Duration,
    workers: IndexMap<String, WorkerHandle>,
    log: CrossingLog,
}

impl ThreadController {
    /// Create a controller with the configured step timeout.
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            step_timeout: config.step_timeout(),
            workers: IndexMap::new(),
            log: CrossingLog::default(),
        }
    }

    /// Spawn a worker thread for the contract. The worker performs
    /// `initialize()`, then begins the run phase and blocks at its first
    /// breakpoint (if any).
    pub fn start(&mut self, contract_id: impl Into<String>, runnable: Box<dyn Runnable>) -> Result<()> {
        let contract_id = contract_id.into();
        if self.workers.contains_key(&contract_id) {
            return Err(HarnessError::Resolution(format!(
                "contract id `{contract_id}` started twice"
            )));
        }
        let shared = WorkerShared::new(contract_id.clone());
        let cx = WorkerContext::new(shared.clone());
        let join = thread::Builder::new()
            .name(format!("interlock-{contract_id}"))
            .spawn(move || worker_main(runnable, cx))
            .map_err(|err| HarnessError::RunPhase {
                contract: contract_id.clone(),
                message: format!("failed to spawn worker thread: {err}"),
            })?;
        info!(contract = %contract_id, "worker started");
        self.workers.insert(
            contract_id,
            WorkerHandle {
                shared,
                join: Some(join),
            },
        );
        Ok(())
    }

    /// Advance the contract's worker until it parks at `breakpoint`,
    /// resuming it through any intermediate breakpoints.
    ///
    /// Fails with [`HarnessError::StepTimeout`] when the worker already
    /// passed the breakpoint, completes without reaching it, or does not
    /// reach it within the configured bound. A captured contract error is
    /// surfaced as-is.
    pub fn step_to(&mut self, contract_id: &str, breakpoint: &str) -> Result<()> {
        let shared = self.shared_for(contract_id)?;
        let deadline = Instant::now() + self.step_timeout;
        let mut state = shared.state.lock();

        // a breakpoint the worker was already resumed past can never be
        // reached again within this run
        if self.log.contains(contract_id, breakpoint)
            && state.phase != WorkerPhase::AtBreakpoint(breakpoint.to_owned())
        {
            return Err(HarnessError::StepTimeout {
                contract: contract_id.to_owned(),
                target: format!("breakpoint `{breakpoint}` (already passed)"),
                waited_ms: 0,
            });
        }

        loop {
            match state.phase.clone() {
                WorkerPhase::AtBreakpoint(at) => {
                    if !state.acknowledged {
                        state.acknowledged = true;
                        self.log.record(contract_id, &at);
                    }
                    if at == breakpoint {
                        debug!(contract = contract_id, breakpoint, "step satisfied");
                        return Ok(());
                    }
                    state.resume_pending = true;
                    shared.resumed.notify_one();
                }
                WorkerPhase::Completed => {
                    return Err(HarnessError::StepTimeout {
                        contract: contract_id.to_owned(),
                        target: format!("breakpoint `{breakpoint}` (worker completed first)"),
                        waited_ms: 0,
                    });
                }
                WorkerPhase::Failed => {
                    return Err(state.error.clone().unwrap_or_else(|| {
                        HarnessError::RunPhase {
                            contract: contract_id.to_owned(),
                            message: "worker failed without a recorded error".to_owned(),
                        }
                    }));
                }
                WorkerPhase::NotStarted | WorkerPhase::Initializing | WorkerPhase::Running => {}
            }
            if shared.stopped.wait_until(&mut state, deadline).timed_out() {
                warn!(contract = contract_id, breakpoint, "step timed out");
                return Err(HarnessError::StepTimeout {
                    contract: contract_id.to_owned(),
                    target: format!("breakpoint `{breakpoint}`"),
                    waited_ms: self.step_timeout.as_millis() as u64,
                });
            }
        }
    }

    /// Resume the contract's worker unconditionally until its run phase and
    /// teardown complete, then join the thread. Captured run-phase and
    /// teardown errors are surfaced.
    pub fn finish(&mut self, contract_id: &str) -> Result<()> {
        let shared = self.shared_for(contract_id)?;
        let deadline = Instant::now() + self.step_timeout;
        let result = {
            let mut state = shared.state.lock();
            loop {
                match state.phase.clone() {
                    WorkerPhase::AtBreakpoint(at) => {
                        if !state.acknowledged {
                            state.acknowledged = true;
                            self.log.record(contract_id, &at);
                        }
                        state.resume_pending = true;
                        shared.resumed.notify_one();
                    }
                    WorkerPhase::Completed => break Ok(()),
                    WorkerPhase::Failed => {
                        break Err(state.error.clone().unwrap_or_else(|| {
                            HarnessError::RunPhase {
                                contract: contract_id.to_owned(),
                                message: "worker failed without a recorded error".to_owned(),
                            }
                        }));
                    }
                    WorkerPhase::NotStarted
                    | WorkerPhase::Initializing
                    | WorkerPhase::Running => {}
                }
                if shared.stopped.wait_until(&mut state, deadline).timed_out() {
                    break Err(HarnessError::StepTimeout {
                        contract: contract_id.to_owned(),
                        target: "completion".to_owned(),
                        waited_ms: self.step_timeout.as_millis() as u64,
                    });
                }
            }
        };
        // on timeout the worker is still live; abort() takes care of the join
        if !matches!(result, Err(HarnessError::StepTimeout { .. })) {
            if let Some(worker) = self.workers.get_mut(contract_id) {
                worker.join_thread();
                debug!(contract = contract_id, "worker joined");
            }
        }
        result
    }

    /// Force-resume every remaining worker, detach it from breakpoint
    /// control, and join all spawned threads. Used after an unrecoverable
    /// contract error so one misbehaving contract cannot hang the scenario.
    pub fn abort(&mut self) {
        let mut joined = 0usize;
        for (contract_id, worker) in self.workers.iter_mut() {
            worker.shared.detach();
            if let Some(handle) = worker.join.take() {
                if handle.join().is_err() {
                    warn!(contract = %contract_id, "worker thread join reported panic during abort");
                }
                joined += 1;
            }
        }
        if joined > 0 {
            info!(joined, "scenario aborted; remaining workers detached and joined");
        }
    }

    /// Snapshot of a contract's current phase.
    pub fn phase(&self, contract_id: &str) -> Option<WorkerPhase> {
        self.workers.get(contract_id).map(WorkerHandle::phase)
    }

    /// Contract ids whose worker threads have not been joined yet.
    pub(crate) fn unjoined_ids(&self) -> Vec<String> {
        self.workers
            .iter()
            .filter(|(_, worker)| worker.join.is_some())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Drain the crossing log. Call once, after every contract is terminal.
    pub(crate) fn take_crossings(&mut self) -> Vec<Crossing> {
        std::mem::take(&mut self.log).into_entries()
    }

    /// Terminal outcome per contract, in declaration order.
    pub(crate) fn outcomes(&self) -> IndexMap<String, ContractOutcome> {
        let mut outcomes = IndexMap::new();
        for (contract_id, worker) in &self.workers {
            let state = worker.shared.state.lock();
            let outcome = match state.phase {
                WorkerPhase::Completed => ContractOutcome::Completed,
                WorkerPhase::Failed => {
                    let primary = state
                        .error
                        .clone()
                        .unwrap_or_else(|| HarnessError::RunPhase {
                            contract: contract_id.clone(),
                            message: "worker failed without a recorded error".to_owned(),
                        });
                    let teardown_error = match (&state.teardown_error, &primary) {
                        (Some(teardown), primary) if teardown != primary => {
                            Some(teardown.to_string())
                        }
                        _ => None,
                    };
                    ContractOutcome::Failed {
                        error: primary.to_string(),
                        teardown_error,
                    }
                }
                _ => ContractOutcome::Failed {
                    error: format!("contract `{contract_id}` never reached a terminal state"),
                    teardown_error: None,
                },
            };
            outcomes.insert(contract_id.clone(), outcome);
        }
        outcomes
    }

    fn shared_for(&self, contract_id: &str) -> Result<Arc<WorkerShared>> {
        self.workers
            .get(contract_id)
            .map(|worker| worker.shared.clone())
            .ok_or_else(|| {
                HarnessError::Resolution(format!("no contract started under id `{contract_id}`"))
            })
    }
}

impl Drop for ThreadController {
    fn drop(&mut self) {
        // every spawned worker must be joined even if the caller bailed out
        if self.workers.values().any(|worker| worker.join.is_some()) {
            self.abort();
        }
    }
}

/// Worker thread body: initialize, run under breakpoint control, tear down,
/// record the terminal state. Panics in any hook are caught and mapped to
/// the corresponding error kind so the controller never hangs on a dead
/// worker.
fn worker_main(mut runnable: Box<dyn Runnable>, cx: WorkerContext) {
    let shared = cx.shared_handle();
    let contract = shared.contract_id.clone();
    debug!(
        contract = %contract,
        method = runnable.method_id().unwrap_or("<inline>"),
        "worker body entered"
    );

    shared.set_phase(WorkerPhase::Initializing);
    match panic::catch_unwind(AssertUnwindSafe(|| runnable.initialize())) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            shared.fail(HarnessError::Initialization {
                contract: contract.clone(),
                message: format!("{err:#}"),
            });
            return;
        }
        Err(payload) => {
            shared.fail(HarnessError::Initialization {
                contract: contract.clone(),
                message: format!("initialize panicked: {}", panic_message(payload)),
            });
            return;
        }
    }

    shared.set_phase(WorkerPhase::Running);
    let run_error = match panic::catch_unwind(AssertUnwindSafe(|| runnable.run(&cx))) {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(classify_run_error(&contract, err)),
        Err(payload) => Some(HarnessError::RunPhase {
            contract: contract.clone(),
            message: format!("run phase panicked: {}", panic_message(payload)),
        }),
    };

    let teardown_error = match panic::catch_unwind(AssertUnwindSafe(|| runnable.terminate())) {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(HarnessError::Teardown {
            contract: contract.clone(),
            message: format!("{err:#}"),
        }),
        Err(payload) => Some(HarnessError::Teardown {
            contract: contract.clone(),
            message: format!("terminate panicked: {}", panic_message(payload)),
        }),
    };

    shared.complete(run_error, teardown_error);
}

/// Harness errors raised inside the run phase (duplicate breakpoints in
/// particular) keep their kind; anything else is a run-phase failure.
fn classify_run_error(contract: &str, err: anyhow::Error) -> HarnessError {
    match err.downcast::<HarnessError>() {
        Ok(harness_error) => harness_error,
        Err(err) => HarnessError::RunPhase {
            contract: contract.to_owned(),
            message: format!("{err:#}"),
        },
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_owned()
    }
}
