//! Tracing subscriber setup.

use anyhow::anyhow;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber: `RUST_LOG` if set, otherwise the given
/// default directives (e.g. "info,waypoint_ln=debug").
pub fn try_init(default_directives: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives))
        .map_err(|e| anyhow!("Invalid logger directives: {e}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow!("Couldn't init logger: {e}"))
}

/// Like [`try_init`], but ignores an already-installed subscriber, which is
/// what tests and embedders want.
pub fn init(default_directives: &str) {
    let _ = try_init(default_directives);
}
