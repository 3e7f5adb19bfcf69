//! Logging setup for applications embedding rdstore.
//!
//! The library itself only emits `tracing` events. Installing a subscriber
//! is left to the host process, which calls [`init_logging`] once at startup.
use tracing::Level;

/// Installs a formatting subscriber that writes events at `level` and above
/// to stderr.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case the existing one stays in place.
pub fn init_logging(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
