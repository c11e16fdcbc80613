//! Small port/filesystem/process-location utilities the supervisor builds on.

use crate::error::{HarnessError, HarnessResult};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the mock server binary location.
pub const SERVER_BIN_ENV: &str = "SHOAL_SERVER_BIN";

/// Name of the mock server binary.
const SERVER_BIN_NAME: &str = "shoald";

/// Ask the OS for a currently-unused port.
///
/// The port is released again before the subprocess binds it, so a clash is
/// possible in principle; the supervisor's retry loop absorbs that.
pub fn ephemeral_port() -> HarnessResult<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

/// Remove a directory tree, retrying transient failures.
///
/// Teardown must not abort on best-effort steps: after `attempts` failures
/// the error is logged and swallowed.
pub async fn remove_dir_with_retry(path: &Path, attempts: u32) {
    for attempt in 1..=attempts {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => return,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) if attempt == attempts => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "giving up removing working directory"
                );
            }
            Err(e) => {
                tracing::debug!(
                    path = %path.display(),
                    attempt,
                    error = %e,
                    "retrying working-directory removal"
                );
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Locate the mock server binary.
///
/// Resolution order: the `SHOAL_SERVER_BIN` environment variable, then a
/// sibling of the current executable (where cargo places workspace
/// binaries next to test executables).
pub fn server_binary() -> HarnessResult<PathBuf> {
    if let Ok(path) = std::env::var(SERVER_BIN_ENV) {
        return Ok(PathBuf::from(path));
    }

    let mut dir = std::env::current_exe()?;
    dir.pop();
    // Test executables live in target/<profile>/deps; binaries one level up.
    if dir.ends_with("deps") {
        dir.pop();
    }
    let candidate = dir.join(format!("{SERVER_BIN_NAME}{}", std::env::consts::EXE_SUFFIX));
    if candidate.exists() {
        Ok(candidate)
    } else {
        Err(HarnessError::Config(format!(
            "mock server binary not found at {}; build the workspace or set {SERVER_BIN_ENV}",
            candidate.display()
        )))
    }
}
