//! Logging setup for the binary.
//!
//! Diagnostics go to stderr so stdout stays clean for the summary table.
//! `MISIM_LOG` takes an `EnvFilter` directive (`MISIM_LOG=mi_sim=debug`);
//! a `.env` file in the working directory is read first.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

const DEFAULT_FILTER: &str = "mi_sim=info";
const VERBOSE_FILTER: &str = "mi_sim=debug";

/// Install the global subscriber. Safe to call more than once.
pub fn init_logging(verbose: bool) {
    INIT.call_once(|| {
        let _ = dotenvy::dotenv();

        let fallback = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
        let filter = EnvFilter::try_from_env("MISIM_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    });
}
