//! `tracing` initialisation. Called once from the CLI binary's `main()`
//! before anything else runs.

use crate::config::ObservabilityConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global `tracing` subscriber. `DESKAGENT_QUIET` suppresses all
/// output; `DESKAGENT_LOG_JSON` switches the formatter from compact to JSON
/// lines for machine consumption.
pub fn init() {
    let cfg = ObservabilityConfig::from_env();
    if cfg.quiet {
        return;
    }
    let filter = EnvFilter::try_new(&cfg.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if cfg.log_json {
        let _ = registry.with(fmt::layer().json()).try_init();
    } else {
        let _ = registry.with(fmt::layer().compact()).try_init();
    }
}
