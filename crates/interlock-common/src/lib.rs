//! ---
//! ilk_section: "01-shared-runtime"
//! ilk_subsection: "module"
//! ilk_type: "source"
//! ilk_scope: "code"
//! ilk_description: "Shared configuration and logging helpers."
//! ilk_version: "v0.1.0"
//! ilk_owner: "tbd"
//! ---
//! Shared plumbing for the Interlock workspace: harness configuration
//! loading and `tracing` subscriber setup. The controlled-execution core
//! lives in `interlock-harness`; this crate deliberately carries no
//! scheduling logic.

#![warn(missing_docs)]

pub mod config;
pub mod logging;

pub use config::{HarnessConfig, LoggingConfig};
pub use logging::init_tracing;
