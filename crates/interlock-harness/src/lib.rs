//! ---
//! ilk_section: "02-controlled-execution"
//! ilk_subsection: "module"
//! ilk_type: "source"
//! ilk_scope: "code"
//! ilk_description: "Controlled-execution core for deterministic interleaving."
//! ilk_version: "v0.1.0"
//! ilk_owner: "tbd"
//! ---
//! Controlled-execution core of the Interlock harness.
//!
//! A test supplies one [`Runnable`] contract per method under test. The
//! [`ThreadController`] runs each contract on a dedicated OS thread and
//! pauses it at named breakpoints, so the test can interleave several
//! threads in an exact, reproducible order. The [`Scenario`] facade is the
//! surface most tests use: declare contracts, declare the interleaving
//! plan, run, and assert on the returned [`ExecutionReport`].

#![warn(missing_docs)]

pub mod breakpoint;
pub mod collector;
pub mod controller;
pub mod runnable;
pub mod scenario;
pub mod worker;

/// Shared result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Error kinds produced by the controlled-execution core.
///
/// Errors raised inside a single contract's lifecycle are attached to that
/// contract's worker handle; the controller surfaces them at the next
/// `step_to`/`finish` and converts the scenario into an abort.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HarnessError {
    /// A method identifier or contract reference could not be resolved.
    /// Always raised before any worker thread is spawned.
    #[error("resolution failed: {0}")]
    Resolution(String),
    /// The contract's `initialize` hook failed; the scenario is aborted for
    /// that contract before any breakpoint is reached.
    #[error("contract `{contract}` initialization failed: {message}")]
    Initialization {
        /// Contract whose setup failed.
        contract: String,
        /// Rendered failure cause.
        message: String,
    },
    /// The contract's `terminate` hook failed. Recorded, but never masks an
    /// earlier run-phase error.
    #[error("contract `{contract}` teardown failed: {message}")]
    Teardown {
        /// Contract whose teardown failed.
        contract: String,
        /// Rendered failure cause.
        message: String,
    },
    /// The same breakpoint name was registered or crossed twice within one
    /// contract's run.
    #[error("duplicate breakpoint `{breakpoint}` in contract `{contract}`")]
    DuplicateBreakpoint {
        /// Contract owning the breakpoint.
        contract: String,
        /// Offending breakpoint name.
        breakpoint: String,
    },
    /// A bounded controller wait elapsed before the worker reached the
    /// requested target, or the worker can no longer reach it at all.
    #[error("contract `{contract}` did not reach {target} within {waited_ms}ms")]
    StepTimeout {
        /// Contract being stepped.
        contract: String,
        /// Human-readable target (breakpoint name or completion).
        target: String,
        /// How long the controller waited before giving up.
        waited_ms: u64,
    },
    /// An uncaught failure (error return or panic) escaped the controlled
    /// call.
    #[error("contract `{contract}` run phase failed: {message}")]
    RunPhase {
        /// Contract whose run phase failed.
        contract: String,
        /// Rendered failure cause.
        message: String,
    },
}

/// Single scenario-level failure returned by [`Scenario::run`].
///
/// Carries the first fatal contract error plus the partial
/// [`ExecutionReport`] captured before the abort, so a test can see how far
/// the interleaving progressed.
#[derive(Debug, thiserror::Error)]
#[error("scenario aborted: {error}")]
pub struct ScenarioFailure {
    /// First fatal error observed by the controller.
    #[source]
    pub error: HarnessError,
    /// Crossings and outcomes captured up to the abort.
    pub report: collector::ExecutionReport,
}

pub use breakpoint::WorkerContext;
pub use collector::{ContractOutcome, Crossing, ExecutionReport};
pub use controller::ThreadController;
pub use runnable::{FnRunnable, MethodTable, Runnable, RunnableBuilder};
pub use scenario::Scenario;
pub use worker::{WorkerHandle, WorkerPhase};
