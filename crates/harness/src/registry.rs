//! Live-bucket registry with reference-counted teardown.
//!
//! All logical buckets created against one mock server share its physical
//! backing store. The registry tracks the live set: the backing state is
//! wiped only when the set empties, except that releasing the first-created
//! ("primary") bucket forces the wipe early, because identity state bound to
//! it cannot be partially deleted while referenced.
//!
//! Bucket-name allocation is sequential and unsynchronized; the registry
//! assumes a single-threaded test orchestrator. Parallel workers each own an
//! independent registry and server instance.

use crate::client::ObjectAccess;
use crate::error::{HarnessError, HarnessResult};
use crate::permissions::PermissionController;
use shoal_core::{ClientEnvironment, ConnectionDescriptor, Credential};
use std::path::PathBuf;

/// Where the backing server lives, as fixtures need to describe it.
#[derive(Clone, Debug)]
pub struct EndpointInfo {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub ca_cert_path: Option<PathBuf>,
    pub region: String,
}

/// One live logical bucket.
#[derive(Clone, Debug)]
pub struct BucketEntry {
    pub bucket: String,
    pub descriptor: ConnectionDescriptor,
    pub credential: Credential,
    /// True for the first bucket allocated by this registry.
    pub is_primary: bool,
}

/// Registry of the logical buckets sharing one mock server.
pub struct BucketRegistry {
    permissions: PermissionController,
    endpoint: EndpointInfo,
    default_prefix: Option<String>,
    /// Use the prefix as-is instead of appending the library name.
    use_raw_prefix: bool,
    entries: Vec<BucketEntry>,
    next_bucket_id: u32,
}

impl BucketRegistry {
    /// Create a registry over a permission controller bound to the backing
    /// server.
    pub fn new(
        permissions: PermissionController,
        endpoint: EndpointInfo,
        default_prefix: Option<String>,
        use_raw_prefix: bool,
    ) -> Self {
        Self {
            permissions,
            endpoint,
            default_prefix,
            use_raw_prefix,
            entries: Vec::new(),
            next_bucket_id: 0,
        }
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The permission controller for this registry's server.
    pub fn permissions(&self) -> &PermissionController {
        &self.permissions
    }

    pub fn permissions_mut(&mut self) -> &mut PermissionController {
        &mut self.permissions
    }

    /// Allocate the next bucket, create it physically, derive a credential
    /// and register the entry.
    ///
    /// When enforcement is active every bucket gets a freshly issued
    /// identity; otherwise all buckets share the default credential.
    pub async fn create_bucket(&mut self, versioned: bool) -> HarnessResult<BucketEntry> {
        let bucket = format!("test_bucket_{}", self.next_bucket_id);
        let is_primary = self.next_bucket_id == 0;
        let client = self.permissions.client().clone();

        client.create_bucket(&bucket).await?;
        if versioned {
            client.put_bucket_versioning(&bucket, true).await?;
        }
        self.next_bucket_id += 1;

        let credential = if self.permissions.enforcing() {
            self.permissions
                .create_bucket_user(&format!("{bucket}_user"))
                .await?
        } else {
            Credential::fixture_default()
        };

        let descriptor = ConnectionDescriptor {
            host: self.endpoint.host.clone(),
            port: Some(self.endpoint.port),
            bucket: bucket.clone(),
            access: credential.id.clone(),
            secret: credential.secret.clone(),
            path_prefix: self.default_prefix.clone(),
            use_tls: self.endpoint.use_tls,
            ca_cert_path: self.endpoint.ca_cert_path.clone(),
        };

        let entry = BucketEntry {
            bucket: bucket.clone(),
            descriptor,
            credential,
            is_primary,
        };
        self.entries.push(entry.clone());
        tracing::info!(%bucket, is_primary, live = self.entries.len(), "bucket fixture created");
        Ok(entry)
    }

    /// Release a bucket, tearing down shared backing state once nothing
    /// references it.
    ///
    /// Releasing the last entry resets the whole backend (cheap, nothing
    /// references it). Releasing the primary entry while others remain live
    /// still forces the full reset, after deleting the physical bucket.
    /// Releasing a non-primary entry deletes only the bucket and the
    /// identity issued for it.
    pub async fn release_bucket(&mut self, entry: &BucketEntry) -> HarnessResult<()> {
        let index = self
            .entries
            .iter()
            .position(|e| e.bucket == entry.bucket)
            .ok_or_else(|| HarnessError::BucketNotFound(entry.bucket.clone()))?;
        let removed = self.entries.remove(index);
        let client = self.permissions.client().clone();

        if self.entries.is_empty() {
            client.reset().await?;
            self.permissions.notify_backend_reset();
            tracing::info!(bucket = %removed.bucket, "last bucket released, backend reset");
            return Ok(());
        }

        self.purge_objects(&client, &removed.bucket).await;
        client.delete_bucket(&removed.bucket).await?;

        if removed.is_primary {
            // Identity state bound to the primary cannot be partially
            // deleted while other buckets still reference the backend.
            client.reset().await?;
            self.permissions.notify_backend_reset();
            tracing::info!(bucket = %removed.bucket, "primary bucket released, backend reset");
        } else if !removed.credential.is_fixture_default() {
            let user = removed.credential.display_name.clone();
            if let Err(e) = client.delete_user_policy(&user, "bucket").await {
                tracing::warn!(%user, error = %e, "failed to delete bucket policy");
            }
            client.delete_user(&user).await?;
            tracing::info!(bucket = %removed.bucket, %user, "bucket and its identity released");
        } else {
            tracing::info!(bucket = %removed.bucket, "bucket released");
        }
        Ok(())
    }

    /// Grant or revoke access to a bucket's issued credential.
    pub async fn grant_access(
        &self,
        entry: &BucketEntry,
        read: bool,
        write: bool,
    ) -> HarnessResult<()> {
        self.permissions
            .grant_bucket_access(&entry.credential, read, write)
            .await
    }

    /// Names of the objects currently stored in a bucket.
    pub async fn object_names(&self, entry: &BucketEntry) -> HarnessResult<Vec<String>> {
        self.permissions.client().list_objects(&entry.bucket).await
    }

    /// Copy every object of `source` into `destination`.
    pub async fn copy_objects_to(
        &self,
        source: &BucketEntry,
        destination: &BucketEntry,
    ) -> HarnessResult<()> {
        let client = self.permissions.client();
        for key in client.list_objects(&source.bucket).await? {
            let body = client.get_object(&source.bucket, &key).await?;
            client.put_object(&destination.bucket, &key, body).await?;
        }
        Ok(())
    }

    /// Build the client-under-test environment for a library namespace in a
    /// bucket.
    pub fn client_environment(&self, entry: &BucketEntry, library: &str) -> ClientEnvironment {
        let mut env =
            ClientEnvironment::from_descriptor(&entry.descriptor, &self.endpoint.region, library);
        env.path_prefix = self.default_prefix.as_ref().map(|prefix| {
            if self.use_raw_prefix {
                prefix.clone()
            } else {
                format!("{prefix}/{library}")
            }
        });
        env
    }

    /// Best-effort object cleanup before bucket deletion.
    async fn purge_objects(&self, client: &crate::client::AdminClient, bucket: &str) {
        let keys = match client.list_objects(bucket).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(%bucket, error = %e, "failed to list objects for cleanup; the following bucket deletion may also fail");
                return;
            }
        };
        for key in keys {
            if let Err(e) = client.delete_object(bucket, &key).await {
                tracing::warn!(%bucket, %key, error = %e, "failed to delete object during cleanup");
            }
        }
    }
}
