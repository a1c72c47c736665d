//! ---
//! ilk_section: "01-shared-runtime"
//! ilk_subsection: "module"
//! ilk_type: "source"
//! ilk_scope: "code"
//! ilk_description: "Shared configuration and logging helpers."
//! ilk_version: "v0.1.0"
//! ilk_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment variable overriding the step timeout, in milliseconds.
const STEP_TIMEOUT_ENV: &str = "INTERLOCK_STEP_TIMEOUT_MS";

fn default_step_timeout_ms() -> u64 {
    5_000
}

fn default_log_filter() -> String {
    "info".to_owned()
}

/// Top-level configuration for the controlled-execution harness.
///
/// Every field has a usable default so tests can run with
/// `HarnessConfig::default()` and never touch a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Bound on every controller wait for a worker to reach a breakpoint or
    /// terminal state. Exceeding it fails the step instead of hanging the
    /// calling test.
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
    /// Logging settings consumed by [`crate::logging::init_tracing`].
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: default_step_timeout_ms(),
            logging: LoggingConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a TOML file, applying environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read harness config {}", path.display()))?;
        let mut config: HarnessConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse harness config {}", path.display()))?;
        config.apply_env_overrides()?;
        debug!(path = %path.display(), step_timeout_ms = config.step_timeout_ms, "loaded harness config");
        Ok(config)
    }

    /// Apply `INTERLOCK_STEP_TIMEOUT_MS` when present.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var(STEP_TIMEOUT_ENV) {
            let millis: u64 = raw
                .parse()
                .with_context(|| format!("invalid {STEP_TIMEOUT_ENV} value `{raw}`"))?;
            self.step_timeout_ms = millis;
        }
        Ok(())
    }

    /// The bounded wait applied to every `step_to`/`finish` call.
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    /// Builder-style override used heavily by the test suites.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout_ms = timeout.as_millis() as u64;
        self
    }
}

/// Logging settings for the workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when neither `INTERLOCK_LOG` nor `RUST_LOG`
    /// is set (e.g. `info` or `debug,interlock_harness=trace`).
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}
