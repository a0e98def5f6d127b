//! Logging setup for binaries and demos built on this crate.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install a formatted stderr subscriber.
///
/// `RUST_LOG` takes precedence over `default_level`. Returns `false` if a
/// global subscriber was already installed, in which case nothing changes.
pub fn init_logging(default_level: &str) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .is_ok()
}
