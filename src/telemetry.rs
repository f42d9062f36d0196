//! Logging setup.
//!
//! Logs go to stderr through `tracing-subscriber`. `RUST_LOG` wins at
//! startup; otherwise the level follows the profile's debug flag and can be
//! switched at runtime with `setdebug`.

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Handle for changing the log level after initialization.
#[derive(Clone)]
pub struct LogHandle {
    inner: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    /// Switches between debug and normal verbosity.
    pub fn set_debug(&self, debug: bool) -> Result<()> {
        self.inner
            .reload(default_filter(debug))
            .map_err(|err| anyhow::anyhow!("failed to change log level: {err}"))
    }
}

/// Initialize `tracing` for the shell.
///
/// Returns `None` if a subscriber was already installed.
pub fn init_tracing(debug: bool) -> Result<Option<LogHandle>> {
    if tracing::dispatcher::has_been_set() {
        return Ok(None);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(debug));
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(debug)
                .with_file(debug)
                .with_line_number(debug)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialize tracing: {err}"))?;

    Ok(Some(LogHandle { inner: handle }))
}

fn default_filter(debug: bool) -> EnvFilter {
    EnvFilter::new(if debug { "oppy=debug" } else { "oppy=info" })
}
