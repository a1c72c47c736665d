//! ---
//! ilk_section: "02-controlled-execution"
//! ilk_subsection: "module"
//! ilk_type: "source"
//! ilk_scope: "code"
//! ilk_description: "Scenario facade: declare contracts and an interleaving plan."
//! ilk_version: "v0.1.0"
//! ilk_owner: "tbd"
//! ---
use chrono::Utc;
use indexmap::IndexMap;
use interlock_common::config::HarnessConfig;
use tracing::{debug, info};

use crate::collector::ExecutionReport;
use crate::controller::ThreadController;
use crate::runnable::Runnable;
use crate::{HarnessError, ScenarioFailure};

/// One entry of the interleaving plan.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    /// Advance the contract's worker to the named breakpoint.
    Advance { contract: String, breakpoint: String },
    /// Run the contract's worker to completion and join it.
    RunToCompletion { contract: String },
}

impl Step {
    fn contract(&self) -> &str {
        match self {
            Step::Advance { contract, .. } | Step::RunToCompletion { contract } => contract,
        }
    }
}

/// The single entry point most tests use: declare runnable contracts and an
/// interleaving plan, run the scenario, assert on the report.
///
/// The plan exists only for this one invocation; the realized crossing
/// order in the returned [`ExecutionReport`] matches the declared step
/// order exactly, which is the entire point of the harness.
#[derive(Default)]
pub struct Scenario {
    contracts: Vec<(String, Box<dyn Runnable>)>,
    plan: Vec<Step>,
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field(
                "contracts",
                &self.contracts.iter().map(|(id, _)| id).collect::<Vec<_>>(),
            )
            .field("plan", &self.plan)
            .finish()
    }
}

impl Scenario {
    /// Start an empty scenario.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a contract under a scenario-unique identifier.
    pub fn contract(self, contract_id: impl Into<String>, runnable: impl Runnable) -> Self {
        self.boxed_contract(contract_id, Box::new(runnable))
    }

    /// Declare an already-boxed contract, e.g. one resolved from a
    /// [`crate::MethodTable`].
    pub fn boxed_contract(
        mut self,
        contract_id: impl Into<String>,
        runnable: Box<dyn Runnable>,
    ) -> Self {
        self.contracts.push((contract_id.into(), runnable));
        self
    }

    /// Plan step: advance a contract to a named breakpoint.
    pub fn advance(
        mut self,
        contract_id: impl Into<String>,
        breakpoint: impl Into<String>,
    ) -> Self {
        self.plan.push(Step::Advance {
            contract: contract_id.into(),
            breakpoint: breakpoint.into(),
        });
        self
    }

    /// Plan step: run a contract to completion.
    pub fn run_to_completion(mut self, contract_id: impl Into<String>) -> Self {
        self.plan.push(Step::RunToCompletion {
            contract: contract_id.into(),
        });
        self
    }

    /// Run the scenario to completion or abort.
    ///
    /// Contracts the plan never completes are finished implicitly at the
    /// end, so every spawned worker is joined before this returns, on both
    /// the success and the failure path.
    pub fn run(self, config: &HarnessConfig) -> Result<ExecutionReport, ScenarioFailure> {
        let started_at = Utc::now();

        if let Err(error) = self.validate() {
            // plan rejected before any worker thread exists
            return Err(ScenarioFailure {
                error,
                report: ExecutionReport {
                    started_at,
                    finished_at: Utc::now(),
                    crossings: Vec::new(),
                    outcomes: IndexMap::new(),
                },
            });
        }

        let contract_count = self.contracts.len();
        let mut controller = ThreadController::new(config);
        for (contract_id, runnable) in self.contracts {
            if let Err(error) = controller.start(contract_id, runnable) {
                return Err(abort_with(controller, started_at, error));
            }
        }
        info!(contracts = contract_count, steps = self.plan.len(), "scenario started");

        for step in &self.plan {
            debug!(?step, "executing plan step");
            let result = match step {
                Step::Advance {
                    contract,
                    breakpoint,
                } => controller.step_to(contract, breakpoint),
                Step::RunToCompletion { contract } => controller.finish(contract),
            };
            if let Err(error) = result {
                return Err(abort_with(controller, started_at, error));
            }
        }

        for contract_id in controller.unjoined_ids() {
            debug!(contract = %contract_id, "finishing contract not completed by the plan");
            if let Err(error) = controller.finish(&contract_id) {
                return Err(abort_with(controller, started_at, error));
            }
        }

        let report = finalize(controller, started_at);
        info!(
            crossings = report.crossings.len(),
            all_completed = report.all_completed(),
            "scenario finished"
        );
        Ok(report)
    }

    /// Reject duplicate contract ids and plan references to unknown
    /// contracts before spawning anything.
    fn validate(&self) -> crate::Result<()> {
        let mut seen = indexmap::IndexSet::new();
        for (contract_id, _) in &self.contracts {
            if !seen.insert(contract_id.as_str()) {
                return Err(HarnessError::Resolution(format!(
                    "contract id `{contract_id}` declared twice"
                )));
            }
        }
        for step in &self.plan {
            if !seen.contains(step.contract()) {
                return Err(HarnessError::Resolution(format!(
                    "interleaving plan references unknown contract `{}`",
                    step.contract()
                )));
            }
        }
        Ok(())
    }
}

fn abort_with(
    mut controller: ThreadController,
    started_at: chrono::DateTime<Utc>,
    error: HarnessError,
) -> ScenarioFailure {
    controller.abort();
    ScenarioFailure {
        error,
        report: finalize(controller, started_at),
    }
}

fn finalize(mut controller: ThreadController, started_at: chrono::DateTime<Utc>) -> ExecutionReport {
    let outcomes = controller.outcomes();
    let crossings = controller.take_crossings();
    ExecutionReport {
        started_at,
        finished_at: Utc::now(),
        crossings,
        outcomes,
    }
}
