//! Tracing subscriber setup.
//!
//! Query results own stdout, so log events go to stderr or to a file.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::core::{ShellError, ShellResult};

/// Environment variable that overrides `--log-level`.
pub const LOG_ENV: &str = "SQLCMD_LOG";

/// Builds the filter: `SQLCMD_LOG` if set, otherwise `level`.
pub fn build_filter(level: &str) -> ShellResult<EnvFilter> {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|err| ShellError::configuration(format!("Bad log level \"{level}\": {err}")))
}

/// Installs the global subscriber. Calling it twice leaves the first one in
/// place.
pub fn init_tracing(level: &str, log_file: Option<&Path>) -> ShellResult<()> {
    let filter = build_filter(level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
        }
        None => builder.with_writer(io::stderr).try_init(),
    };

    if let Err(err) = installed {
        tracing::debug!("tracing already initialised: {err}");
    }
    Ok(())
}
