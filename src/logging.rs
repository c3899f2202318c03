use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LogLevel;

/// Installs a global fmt subscriber. `RUST_LOG` wins over `level` when set.
/// A no-op when the host already installed one.
pub fn init_tracing(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
