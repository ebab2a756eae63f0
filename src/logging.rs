//! Optional `tracing-subscriber` setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs a global `fmt` subscriber filtered by `RUST_LOG`, defaulting to
/// `info`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init() -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
