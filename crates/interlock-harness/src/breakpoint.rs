//! ---
//! ilk_section: "02-controlled-execution"
//! ilk_subsection: "module"
//! ilk_type: "source"
//! ilk_scope: "code"
//! ilk_description: "Breakpoint declaration and arrival hand-off."
//! ilk_version: "v0.1.0"
//! ilk_owner: "tbd"
//! ---
use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::Mutex;

use crate::worker::WorkerShared;
use crate::{HarnessError, Result};

/// Per-contract breakpoint bookkeeping: declared names and names already
/// crossed during this run. Names must be unique within one run.
#[derive(Debug, Default)]
struct BreakpointRegistry {
    declared: IndexSet<String>,
    crossed: IndexSet<String>,
}

/// Handed to a contract's run phase; the only way code under test talks to
/// the harness.
///
/// `arrive` is the breakpoint declaration surface consumed by whatever
/// places the calls inside the method under test, whether instrumentation
/// or manual insertion.
#[derive(Debug)]
pub struct WorkerContext {
    shared: Arc<WorkerShared>,
    registry: Mutex<BreakpointRegistry>,
}

impl WorkerContext {
    pub(crate) fn new(shared: Arc<WorkerShared>) -> Self {
        Self {
            shared,
            registry: Mutex::new(BreakpointRegistry::default()),
        }
    }

    pub(crate) fn shared_handle(&self) -> Arc<WorkerShared> {
        self.shared.clone()
    }

    /// Identifier of the contract this context belongs to.
    pub fn contract_id(&self) -> &str {
        &self.shared.contract_id
    }

    /// Pre-declare a reachable breakpoint. Declaring the same name twice in
    /// one run is a [`HarnessError::DuplicateBreakpoint`].
    pub fn register(&self, name: &str) -> Result<()> {
        let mut registry = self.registry.lock();
        if !registry.declared.insert(name.to_owned()) {
            return Err(HarnessError::DuplicateBreakpoint {
                contract: self.contract_id().to_owned(),
                breakpoint: name.to_owned(),
            });
        }
        Ok(())
    }

    /// Announce arrival at the named breakpoint and block until the
    /// controller resumes this worker.
    ///
    /// Undeclared names are declared implicitly. Arriving twice at one name
    /// within a run fails the contract with
    /// [`HarnessError::DuplicateBreakpoint`]. After an abort the context is
    /// detached: arrivals record nothing and return immediately.
    pub fn arrive(&self, name: &str) -> Result<()> {
        if self.shared.is_detached() {
            return Ok(());
        }
        {
            let mut registry = self.registry.lock();
            registry.declared.insert(name.to_owned());
            if !registry.crossed.insert(name.to_owned()) {
                return Err(HarnessError::DuplicateBreakpoint {
                    contract: self.contract_id().to_owned(),
                    breakpoint: name.to_owned(),
                });
            }
        }
        self.shared.park_at(name);
        Ok(())
    }
}
