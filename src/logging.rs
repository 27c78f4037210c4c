//! Tracing subscriber bootstrap.

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Installs a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_level`. Returns `false` when a subscriber was already installed,
/// by this function or by someone else.
pub fn init_tracing(default_level: &str) -> bool {
    if INITIALIZED.get().is_some() {
        return false;
    }
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok();
    let _ = INITIALIZED.set(());
    installed
}
