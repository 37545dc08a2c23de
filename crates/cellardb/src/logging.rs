//! Log output for applications embedding the store.
//!
//! The library itself only emits [`tracing`] events and spans; nothing is
//! printed until a subscriber is installed. [`init`] installs a `fmt`
//! subscriber configured from a [`LoggingConfig`].

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Installs a global `fmt` subscriber.
///
/// The filter comes from `RUST_LOG` when it is set, otherwise from
/// `config.level` (any `EnvFilter` directive, e.g. `"cellardb=debug,info"`).
///
/// # Errors
///
/// [`Error::Config`] if the level does not parse or a global subscriber is
/// already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| Error::Config(format!("invalid log level '{}': {e}", config.level)))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_target(config.with_target);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| Error::Config(format!("failed to install subscriber: {e}")))
}
