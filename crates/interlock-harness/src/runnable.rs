//! ---
//! ilk_section: "02-controlled-execution"
//! ilk_subsection: "module"
//! ilk_type: "source"
//! ilk_scope: "code"
//! ilk_description: "Runnable contract lifecycle and method dispatch table."
//! ilk_version: "v0.1.0"
//! ilk_owner: "tbd"
//! ---
use indexmap::IndexMap;

use crate::breakpoint::WorkerContext;
use crate::{HarnessError, Result};

/// Lifecycle contract a test implements to plug a method under test into
/// the harness.
///
/// Every hook except [`Runnable::run`] has a no-op default, so an
/// implementation overrides only what its scenario needs. The contract
/// carries no concurrency guarantees of its own; all synchronization is
/// imposed externally by the controller, and each instance is owned
/// exclusively by the worker thread driving it.
pub trait Runnable: Send + 'static {
    /// Advisory identifier of the method under test, used for logging and
    /// diagnostics only. An implementation may leave it unset and hardcode
    /// the call inside [`Runnable::run`].
    fn method_id(&self) -> Option<&str> {
        None
    }

    /// One-time setup before controlled execution. A failure here aborts
    /// the scenario for this contract before any breakpoint is reached.
    fn initialize(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// The controlled call. Breakpoints are crossed by calling
    /// [`WorkerContext::arrive`] from inside this method.
    fn run(&mut self, cx: &WorkerContext) -> anyhow::Result<()>;

    /// One-time teardown after the run phase, whether it succeeded or not.
    /// A failure is recorded but never masks an earlier run-phase error.
    fn terminate(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

type HookFn = Box<dyn FnMut() -> anyhow::Result<()> + Send>;
type RunFn = Box<dyn FnMut(&WorkerContext) -> anyhow::Result<()> + Send>;

/// Closure-backed [`Runnable`] for tests that do not want a named type.
///
/// The target closure captures its own receiver, which replaces the
/// original notion of a separately supplied "main object": a builder with
/// no run target is a construction-time resolution error, never an implicit
/// static call.
pub struct FnRunnable {
    method_id: Option<String>,
    initialize: Option<HookFn>,
    run: RunFn,
    terminate: Option<HookFn>,
}

impl std::fmt::Debug for FnRunnable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnRunnable")
            .field("method_id", &self.method_id)
            .finish_non_exhaustive()
    }
}

impl Runnable for FnRunnable {
    fn method_id(&self) -> Option<&str> {
        self.method_id.as_deref()
    }

    fn initialize(&mut self) -> anyhow::Result<()> {
        match &mut self.initialize {
            Some(hook) => hook(),
            None => Ok(()),
        }
    }

    fn run(&mut self, cx: &WorkerContext) -> anyhow::Result<()> {
        (self.run)(cx)
    }

    fn terminate(&mut self) -> anyhow::Result<()> {
        match &mut self.terminate {
            Some(hook) => hook(),
            None => Ok(()),
        }
    }
}

/// Builder for [`FnRunnable`] with no-op defaults for every optional hook.
#[derive(Default)]
pub struct RunnableBuilder {
    method_id: Option<String>,
    initialize: Option<HookFn>,
    run: Option<RunFn>,
    terminate: Option<HookFn>,
}

impl RunnableBuilder {
    /// Start an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the advisory method identifier.
    pub fn method_id(mut self, id: impl Into<String>) -> Self {
        self.method_id = Some(id.into());
        self
    }

    /// Supply the setup hook.
    pub fn initialize<F>(mut self, hook: F) -> Self
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        self.initialize = Some(Box::new(hook));
        self
    }

    /// Supply the controlled call.
    pub fn run<F>(mut self, run: F) -> Self
    where
        F: FnMut(&WorkerContext) -> anyhow::Result<()> + Send + 'static,
    {
        self.run = Some(Box::new(run));
        self
    }

    /// Supply the teardown hook.
    pub fn terminate<F>(mut self, hook: F) -> Self
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        self.terminate = Some(Box::new(hook));
        self
    }

    /// Finish the builder. Fails with [`HarnessError::Resolution`] when no
    /// run target was supplied.
    pub fn build(self) -> Result<FnRunnable> {
        let run = self.run.ok_or_else(|| {
            let label = self.method_id.as_deref().unwrap_or("<unnamed>");
            HarnessError::Resolution(format!("contract `{label}` has no run target"))
        })?;
        Ok(FnRunnable {
            method_id: self.method_id,
            initialize: self.initialize,
            run,
            terminate: self.terminate,
        })
    }
}

type RunnableFactory = Box<dyn Fn() -> Box<dyn Runnable> + Send + Sync>;

/// Dispatch table keyed by stable method identifiers.
///
/// Replaces reflective method lookup: a test registers factories under
/// identifiers once, and resolution failure is a plain construction-time
/// error raised before any worker thread exists.
#[derive(Default)]
pub struct MethodTable {
    entries: IndexMap<String, RunnableFactory>,
}

impl std::fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodTable")
            .field("method_ids", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MethodTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a stable method identifier. Re-registering
    /// an identifier replaces the previous factory.
    pub fn register<R, F>(&mut self, method_id: impl Into<String>, factory: F)
    where
        R: Runnable,
        F: Fn() -> R + Send + Sync + 'static,
    {
        self.entries
            .insert(method_id.into(), Box::new(move || Box::new(factory())));
    }

    /// Resolve a method identifier into a fresh contract instance. Fails
    /// with [`HarnessError::Resolution`] for unknown identifiers.
    pub fn resolve(&self, method_id: &str) -> Result<Box<dyn Runnable>> {
        match self.entries.get(method_id) {
            Some(factory) => Ok(factory()),
            None => Err(HarnessError::Resolution(format!(
                "no target registered for method id `{method_id}`"
            ))),
        }
    }

    /// Registered identifiers, in registration order.
    pub fn method_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
