//! Fixture factories: mock, real-cloud and error-simulation backends.

use crate::client::{AdminClient, ObjectAccess};
use crate::error::{HarnessError, HarnessResult};
use crate::permissions::PermissionController;
use crate::process::{MockServerConfig, MockServerProcess};
use crate::registry::{BucketEntry, BucketRegistry, EndpointInfo};
use async_trait::async_trait;
use figment::providers::Env;
use figment::Figment;
use serde::Deserialize;
use shoal_core::{ClientEnvironment, ConnectionDescriptor, Credential};
use std::sync::Arc;

/// A source of bucket fixtures, whatever backend stands behind it.
#[async_trait]
pub trait FixtureFactory {
    /// Produce a bucket fixture.
    async fn create_fixture(&mut self) -> HarnessResult<BucketEntry>;

    /// Release a fixture previously produced by this factory.
    async fn release_fixture(&mut self, entry: &BucketEntry) -> HarnessResult<()>;
}

/// Capability trait for factories that can toggle permission enforcement.
///
/// Callers that need enforcement branch on this interface being implemented,
/// not on the concrete factory type.
#[async_trait]
pub trait PermissionCapable {
    /// Engage or disengage enforcement on the backing server.
    async fn set_enforcing(&mut self, enforcing: bool) -> HarnessResult<()>;

    fn enforcing(&self) -> bool;

    /// Grant or revoke a fixture credential's bucket access.
    async fn grant_bucket_access(
        &self,
        entry: &BucketEntry,
        read: bool,
        write: bool,
    ) -> HarnessResult<()>;
}

/// Configuration for [`MockFixtureFactory`].
#[derive(Clone, Default)]
pub struct MockFactoryConfig {
    pub server: MockServerConfig,
    /// Enable storage-level versioning on every created bucket.
    pub bucket_versioning: bool,
    pub default_prefix: Option<String>,
    /// Use `default_prefix` as-is instead of appending library names.
    pub use_raw_prefix: bool,
    /// Region reported to clients under test. Defaults to `us-east-1`.
    pub region: Option<String>,
}

impl MockFactoryConfig {
    fn region(&self) -> String {
        self.region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string())
    }
}

/// Factory owning one supervised mock server and its bucket registry.
pub struct MockFixtureFactory {
    config: MockFactoryConfig,
    server: Option<MockServerProcess>,
    registry: Option<BucketRegistry>,
}

impl MockFixtureFactory {
    pub fn new(config: MockFactoryConfig) -> Self {
        Self {
            config,
            server: None,
            registry: None,
        }
    }

    /// Start the backing server and set up the registry. No-op when already
    /// active; startup flakiness is retried inside the supervisor.
    pub async fn activate(&mut self) -> HarnessResult<()> {
        if self.server.is_some() {
            return Ok(());
        }
        let server = MockServerProcess::start(&self.config.server).await?;
        let ca_cert = server.tls().map(|t| t.ca_cert.clone());
        let client = AdminClient::new(
            server.endpoint(),
            server.iam_endpoint(),
            Credential::fixture_default(),
            ca_cert.as_deref(),
        )?;
        let permissions = PermissionController::new(client);
        let endpoint = EndpointInfo {
            host: server.host().to_string(),
            port: server.port(),
            use_tls: self.config.server.use_tls,
            ca_cert_path: ca_cert,
            region: self.config.region(),
        };
        self.registry = Some(BucketRegistry::new(
            permissions,
            endpoint,
            self.config.default_prefix.clone(),
            self.config.use_raw_prefix,
        ));
        self.server = Some(server);
        Ok(())
    }

    /// Stop the backing server and drop the registry. Idempotent; teardown
    /// never fails.
    pub async fn deactivate(&mut self) {
        self.registry = None;
        if let Some(mut server) = self.server.take() {
            server.stop().await;
        }
    }

    /// Whether the backing server is up.
    pub fn is_active(&self) -> bool {
        self.server.is_some()
    }

    /// The bucket registry. Fails until [`MockFixtureFactory::activate`] has
    /// run.
    pub fn registry(&self) -> HarnessResult<&BucketRegistry> {
        self.registry
            .as_ref()
            .ok_or_else(|| HarnessError::Config("factory is not active".to_string()))
    }

    pub fn registry_mut(&mut self) -> HarnessResult<&mut BucketRegistry> {
        self.registry
            .as_mut()
            .ok_or_else(|| HarnessError::Config("factory is not active".to_string()))
    }

    /// The supervised server, while active.
    pub fn server(&self) -> Option<&MockServerProcess> {
        self.server.as_ref()
    }

    /// Create a bucket, applying the factory's default versioning flag.
    pub async fn create_bucket(&mut self, versioned: bool) -> HarnessResult<BucketEntry> {
        let versioned = versioned || self.config.bucket_versioning;
        self.registry_mut()?.create_bucket(versioned).await
    }

    pub async fn release_bucket(&mut self, entry: &BucketEntry) -> HarnessResult<()> {
        self.registry_mut()?.release_bucket(entry).await
    }

    /// Build the client-under-test environment for a library in a fixture.
    pub fn client_environment(
        &self,
        entry: &BucketEntry,
        library: &str,
    ) -> HarnessResult<ClientEnvironment> {
        Ok(self.registry()?.client_environment(entry, library))
    }
}

#[async_trait]
impl FixtureFactory for MockFixtureFactory {
    async fn create_fixture(&mut self) -> HarnessResult<BucketEntry> {
        self.create_bucket(false).await
    }

    async fn release_fixture(&mut self, entry: &BucketEntry) -> HarnessResult<()> {
        self.release_bucket(entry).await
    }
}

#[async_trait]
impl PermissionCapable for MockFixtureFactory {
    async fn set_enforcing(&mut self, enforcing: bool) -> HarnessResult<()> {
        self.registry_mut()?
            .permissions_mut()
            .set_enforcing(enforcing)
            .await
    }

    fn enforcing(&self) -> bool {
        self.registry
            .as_ref()
            .is_some_and(|r| r.permissions().enforcing())
    }

    async fn grant_bucket_access(
        &self,
        entry: &BucketEntry,
        read: bool,
        write: bool,
    ) -> HarnessResult<()> {
        self.registry()?.grant_access(entry, read, write).await
    }
}

/// Environment-driven configuration for a pre-existing real cloud bucket.
///
/// Extracted from `SHOAL_REAL_*` variables: `ENDPOINT`, `REGION`, `BUCKET`,
/// `ACCESS_KEY`, `SECRET_KEY`, `CLEAR`, `SHARED_PATH_PREFIX`,
/// `UNIQUE_PATH_PREFIX`.
#[derive(Clone, Debug, Deserialize)]
pub struct RealCloudConfig {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    /// Delete objects under the assigned prefix when the fixture is
    /// released.
    #[serde(default)]
    pub clear: bool,
    pub shared_path_prefix: Option<String>,
    pub unique_path_prefix: Option<String>,
}

/// Environment prefix for [`RealCloudConfig`].
pub const REAL_CLOUD_ENV_PREFIX: &str = "SHOAL_REAL_";

impl RealCloudConfig {
    /// Read the configuration from the environment.
    pub fn from_env() -> HarnessResult<Self> {
        let config: Self = Figment::new()
            .merge(Env::prefixed(REAL_CLOUD_ENV_PREFIX))
            .extract()
            .map_err(|e| HarnessError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> HarnessResult<()> {
        for (name, value) in [
            ("endpoint", &self.endpoint),
            ("region", &self.region),
            ("bucket", &self.bucket),
            ("access_key", &self.access_key),
            ("secret_key", &self.secret_key),
        ] {
            if value.is_empty() {
                return Err(HarnessError::Config(format!(
                    "real cloud config field must not be empty: {name}"
                )));
            }
        }
        Ok(())
    }
}

/// Factory wrapping one pre-existing cloud bucket.
///
/// No lifecycle of its own: it never creates or deletes the bucket, and
/// cleanup touches only objects under its assigned path-prefix namespace,
/// through the object-access capability the caller injects.
pub struct RealCloudFactory {
    config: RealCloudConfig,
    path_prefix: Option<String>,
    host: String,
    port: Option<u16>,
    use_tls: bool,
    access: Option<Arc<dyn ObjectAccess>>,
}

impl RealCloudFactory {
    /// Build from the environment. `shared_path` selects the shared prefix
    /// over the per-run unique one.
    pub fn from_env(
        shared_path: bool,
        access: Option<Arc<dyn ObjectAccess>>,
    ) -> HarnessResult<Self> {
        Self::new(RealCloudConfig::from_env()?, shared_path, access)
    }

    pub fn new(
        config: RealCloudConfig,
        shared_path: bool,
        access: Option<Arc<dyn ObjectAccess>>,
    ) -> HarnessResult<Self> {
        let url = reqwest::Url::parse(&config.endpoint)
            .map_err(|e| HarnessError::Config(format!("invalid endpoint: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| HarnessError::Config("endpoint has no host".to_string()))?
            .to_string();
        let use_tls = url.scheme() == "https";
        let path_prefix = if shared_path {
            config.shared_path_prefix.clone()
        } else {
            config.unique_path_prefix.clone()
        };
        Ok(Self {
            port: url.port(),
            host,
            use_tls,
            path_prefix,
            config,
            access,
        })
    }

    /// The fixture over the pre-existing bucket.
    pub fn fixture(&self) -> BucketEntry {
        BucketEntry {
            bucket: self.config.bucket.clone(),
            descriptor: ConnectionDescriptor {
                host: self.host.clone(),
                port: self.port,
                bucket: self.config.bucket.clone(),
                access: self.config.access_key.clone(),
                secret: self.config.secret_key.clone(),
                path_prefix: self.path_prefix.clone(),
                use_tls: self.use_tls,
                ca_cert_path: None,
            },
            credential: Credential::new(
                self.config.access_key.clone(),
                self.config.secret_key.clone(),
                "unknown user",
            ),
            is_primary: false,
        }
    }

    pub fn client_environment(&self, library: &str) -> ClientEnvironment {
        let mut env = ClientEnvironment::from_descriptor(
            &self.fixture().descriptor,
            &self.config.region,
            library,
        );
        env.path_prefix = self
            .path_prefix
            .as_ref()
            .map(|prefix| format!("{prefix}/{library}"));
        env
    }

    /// Delete objects under the assigned prefix, never the bucket itself.
    ///
    /// Skipped unless `clear` was configured; leftover objects are logged
    /// rather than failing teardown.
    pub async fn cleanup(&self) -> HarnessResult<()> {
        if !self.config.clear {
            return Ok(());
        }
        let Some(prefix) = &self.path_prefix else {
            tracing::warn!("refusing to clean a shared bucket without a path prefix");
            return Ok(());
        };
        let Some(access) = &self.access else {
            tracing::warn!("no object access injected, skipping real-cloud cleanup");
            return Ok(());
        };
        let keys = access.list_objects(&self.config.bucket).await?;
        for key in keys.iter().filter(|k| k.starts_with(prefix.as_str())) {
            if let Err(e) = access.delete_object(&self.config.bucket, key).await {
                tracing::warn!(
                    %key,
                    error = %e,
                    "object left behind; it accrues storage charges until deleted manually"
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FixtureFactory for RealCloudFactory {
    async fn create_fixture(&mut self) -> HarnessResult<BucketEntry> {
        Ok(self.fixture())
    }

    async fn release_fixture(&mut self, _entry: &BucketEntry) -> HarnessResult<()> {
        self.cleanup().await
    }
}

/// Factory producing fault-simulating fixtures.
///
/// No physical backend exists; the endpoint and credentials are
/// placeholders, and the client environment carries the fault-injection
/// flag the client under test acts on.
#[derive(Clone, Debug, Default)]
pub struct ErrorSimulationFactory {
    region: Option<String>,
}

impl ErrorSimulationFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn region(&self) -> String {
        self.region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string())
    }

    pub fn fixture(&self) -> BucketEntry {
        let credential = Credential::new("access key", "secret key", "unknown user");
        BucketEntry {
            bucket: "simulated".to_string(),
            descriptor: ConnectionDescriptor {
                host: "test".to_string(),
                port: None,
                bucket: "simulated".to_string(),
                access: credential.id.clone(),
                secret: credential.secret.clone(),
                path_prefix: None,
                use_tls: false,
                ca_cert_path: None,
            },
            credential,
            is_primary: false,
        }
    }

    pub fn client_environment(&self, library: &str) -> ClientEnvironment {
        let mut env =
            ClientEnvironment::from_descriptor(&self.fixture().descriptor, self.region(), library);
        env.simulate_faults = true;
        env
    }
}

#[async_trait]
impl FixtureFactory for ErrorSimulationFactory {
    async fn create_fixture(&mut self) -> HarnessResult<BucketEntry> {
        Ok(self.fixture())
    }

    async fn release_fixture(&mut self, _entry: &BucketEntry) -> HarnessResult<()> {
        Ok(())
    }
}
