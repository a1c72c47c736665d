//! ---
//! ilk_section: "01-shared-runtime"
//! ilk_subsection: "module"
//! ilk_type: "source"
//! ilk_scope: "code"
//! ilk_description: "Shared configuration and logging helpers."
//! ilk_version: "v0.1.0"
//! ilk_owner: "tbd"
//! ---
use once_cell::sync::OnceCell;
use tracing::debug;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "INTERLOCK_LOG";

static INIT: OnceCell<()> = OnceCell::new();

/// Initialize the tracing subscriber for harness runs.
///
/// * `INTERLOCK_LOG` overrides the filter when set; otherwise the standard
///   `RUST_LOG` variable is honoured, finally falling back to the configured
///   default directive.
/// * Safe to call from every test in a binary: only the first call installs
///   a subscriber, later calls are no-ops.
pub fn init_tracing(config: &LoggingConfig) {
    let default_directive = config.filter.clone();
    INIT.get_or_init(|| {
        let filter = match std::env::var(LOG_ENV) {
            Ok(directive) => EnvFilter::try_new(directive).unwrap_or_else(|err| {
                eprintln!("invalid {LOG_ENV} directive ({err}); using `{default_directive}`");
                EnvFilter::new(&default_directive)
            }),
            Err(_) => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&default_directive)),
        };

        let fmt_layer = fmt::layer().with_target(false).with_thread_names(true);

        // try_init rather than init: another subscriber may already be
        // installed by the enclosing test binary.
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init();
        debug!("tracing initialized");
    });
}
