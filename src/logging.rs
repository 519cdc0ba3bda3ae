use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Log to stderr so command output on stdout stays machine-readable.
///
/// `RUST_LOG` takes precedence over the configured default directive.
pub fn init(default_directive: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive).or_raise(|| ErrorKind::Logging)?,
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init()
        .or_raise(|| ErrorKind::Logging)
}
