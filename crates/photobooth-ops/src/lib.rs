//! Operational helpers: logging setup, directory preparation, startup retries.

use std::{path::PathBuf, thread, time::Duration};

use photobooth_types::{config::OpsConfig, PhotoboothError, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| PhotoboothError::Ops(format!("failed to create log filter: {err}")))?;

    fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .map_err(|err| PhotoboothError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}

pub fn ensure_capture_dir(path: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(path);
    std::fs::create_dir_all(&dir).map_err(|err| {
        PhotoboothError::Initialization(format!("failed to create capture dir {path}: {err}"))
    })?;
    info!("Capture directory ready at {:?}", dir);
    Ok(dir)
}

/// Run `op` up to `max_attempts` times, sleeping `backoff` between failures.
/// The last error is returned once attempts are exhausted.
pub fn retry_with_backoff<T, F>(
    what: &str,
    max_attempts: u32,
    backoff: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts => {
                warn!("{what} failed (attempt {attempt}/{max_attempts}): {err}; retrying in {backoff:?}");
                thread::sleep(backoff);
                attempt += 1;
            }
            Err(err) => {
                warn!("{what} failed after {max_attempts} attempt(s): {err}");
                return Err(err);
            }
        }
    }
}
