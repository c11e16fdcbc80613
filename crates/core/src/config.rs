//! Client-environment configuration consumed by the storage client under test.

use crate::descriptor::ConnectionDescriptor;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything the storage client under test needs to reach one library
/// namespace inside a fixture bucket.
///
/// This is the serialized hand-off between a fixture and the client it
/// configures; the harness builds it, the client deserializes it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientEnvironment {
    /// Library (namespace) name within the bucket.
    pub library: String,
    /// Endpoint URL, e.g. `http://localhost:19123`.
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access: String,
    pub secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_path: Option<PathBuf>,
    /// When set, the client under test simulates storage faults instead of
    /// talking to a live backend.
    #[serde(default)]
    pub simulate_faults: bool,
}

impl ClientEnvironment {
    /// Build an environment for `library` from a descriptor plus the region
    /// the factory was configured with.
    pub fn from_descriptor(
        descriptor: &ConnectionDescriptor,
        region: impl Into<String>,
        library: impl Into<String>,
    ) -> Self {
        let scheme = if descriptor.use_tls { "https" } else { "http" };
        let endpoint = match descriptor.port {
            Some(port) => format!("{scheme}://{}:{port}", descriptor.host),
            None => format!("{scheme}://{}", descriptor.host),
        };
        Self {
            library: library.into(),
            endpoint,
            region: region.into(),
            bucket: descriptor.bucket.clone(),
            access: descriptor.access.clone(),
            secret: descriptor.secret.clone(),
            path_prefix: descriptor.path_prefix.clone(),
            use_tls: descriptor.use_tls,
            ca_cert_path: descriptor.ca_cert_path.clone(),
            simulate_faults: false,
        }
    }
}
