//! TLS material provisioning seam.

use crate::error::HarnessResult;
use std::path::{Path, PathBuf};

/// Paths to certificate material a provisioner produced.
#[derive(Clone, Debug)]
pub struct TlsMaterial {
    /// CA certificate clients should trust.
    pub ca_cert: PathBuf,
    /// Server certificate presented by the mock server.
    pub server_cert: PathBuf,
    /// Private key matching `server_cert`.
    pub server_key: PathBuf,
}

/// Produces a CA plus a server certificate/key pair under `dir`.
///
/// Certificate generation itself is outside the harness; test suites inject
/// whichever generator they already carry. The files must outlive the server
/// process, so provisioners write into the supervisor's working directory.
pub trait TlsProvisioner: Send + Sync {
    fn provision(&self, dir: &Path) -> HarnessResult<TlsMaterial>;
}
