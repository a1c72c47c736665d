//! ---
//! ilk_section: "02-controlled-execution"
//! ilk_subsection: "module"
//! ilk_type: "source"
//! ilk_scope: "code"
//! ilk_description: "Crossing log accumulation and the execution report."
//! ilk_version: "v0.1.0"
//! ilk_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One observed breakpoint crossing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crossing {
    /// Contract whose worker crossed the breakpoint.
    pub contract: String,
    /// Breakpoint name.
    pub breakpoint: String,
    /// Scenario-global, wall-clock-independent sequence number (1-based).
    pub sequence: u64,
}

/// Ordered accumulation of crossings for one scenario.
///
/// Entries are appended only by the controller, in the order it satisfied
/// the workers' arrivals, which in turn matches the order the test issued
/// its steps. No algorithm beyond ordered accumulation.
#[derive(Debug, Default)]
pub(crate) struct CrossingLog {
    entries: Vec<Crossing>,
}

impl CrossingLog {
    pub fn record(&mut self, contract: &str, breakpoint: &str) -> u64 {
        let sequence = self.entries.len() as u64 + 1;
        debug!(contract, breakpoint, sequence, "crossing recorded");
        self.entries.push(Crossing {
            contract: contract.to_owned(),
            breakpoint: breakpoint.to_owned(),
            sequence,
        });
        sequence
    }

    pub fn contains(&self, contract: &str, breakpoint: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.contract == contract && entry.breakpoint == breakpoint)
    }

    pub fn into_entries(self) -> Vec<Crossing> {
        self.entries
    }
}

/// Terminal outcome of one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ContractOutcome {
    /// Run phase and teardown finished without error.
    Completed,
    /// The contract failed; `error` is the primary cause and
    /// `teardown_error` is retained separately when teardown also failed.
    Failed {
        /// Rendered primary error.
        error: String,
        /// Rendered teardown error, when distinct from the primary.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        teardown_error: Option<String>,
    },
}

impl ContractOutcome {
    /// Whether the contract completed cleanly.
    pub fn is_completed(&self) -> bool {
        matches!(self, ContractOutcome::Completed)
    }
}

/// Immutable result of one scenario run: the realized crossing sequence
/// across all contracts plus each contract's terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// When the scenario started spawning workers.
    pub started_at: DateTime<Utc>,
    /// When the scenario reached a terminal state for every contract.
    pub finished_at: DateTime<Utc>,
    /// Realized crossings, in controller satisfaction order.
    pub crossings: Vec<Crossing>,
    /// Terminal outcome per contract, in declaration order.
    pub outcomes: IndexMap<String, ContractOutcome>,
}

impl ExecutionReport {
    /// Crossings belonging to one contract, preserving global order.
    pub fn crossings_for<'a>(
        &'a self,
        contract: &'a str,
    ) -> impl Iterator<Item = &'a Crossing> + 'a {
        self.crossings
            .iter()
            .filter(move |crossing| crossing.contract == contract)
    }

    /// Terminal outcome for one contract.
    pub fn outcome(&self, contract: &str) -> Option<&ContractOutcome> {
        self.outcomes.get(contract)
    }

    /// Whether every contract completed cleanly.
    pub fn all_completed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.values().all(ContractOutcome::is_completed)
    }

    /// Dump the report as pretty-printed JSON, creating parent directories
    /// as needed. Intended for post-mortem artifacts under
    /// `target/test-logs/`.
    pub fn write_json(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = fs::File::create(path)
            .with_context(|| format!("failed to create report file {}", path.display()))?;
        serde_json::to_writer_pretty(file, self)
            .with_context(|| format!("failed to serialize report to {}", path.display()))?;
        Ok(())
    }
}
