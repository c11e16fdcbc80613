//! Typed HTTP client for the mock server's storage and identity APIs.
//!
//! One client holds both base URLs because the two backends share a port and
//! are told apart by host name: the storage endpoint uses the configured
//! storage host, the identity endpoint the loopback address.

use crate::error::{HarnessError, HarnessResult};
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use shoal_core::{Credential, PolicyDocument};
use std::path::Path;

/// Header carrying the access key id.
const ACCESS_KEY_HEADER: &str = "x-access-key";
/// Header carrying the access key secret.
const SECRET_KEY_HEADER: &str = "x-secret-key";

/// Opaque object-level access to a bucket, as much of the storage client
/// under test as the harness itself needs: enough to enumerate, copy and
/// clean up objects. Real-cloud cleanup is driven through an implementation
/// the caller supplies.
#[async_trait]
pub trait ObjectAccess: Send + Sync {
    async fn list_objects(&self, bucket: &str) -> HarnessResult<Vec<String>>;
    async fn get_object(&self, bucket: &str, key: &str) -> HarnessResult<Bytes>;
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> HarnessResult<()>;
    async fn delete_object(&self, bucket: &str, key: &str) -> HarnessResult<()>;
}

/// Administrative client for one mock server.
///
/// Cloning is cheap; `with_credential` rebinds a clone to another identity
/// without touching the original.
#[derive(Clone)]
pub struct AdminClient {
    http: reqwest::Client,
    endpoint: String,
    iam_endpoint: String,
    credential: Credential,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    #[allow(dead_code)]
    user_id: String,
    user_name: String,
}

#[derive(Debug, Deserialize)]
struct AccessKeyResponse {
    access_key_id: String,
    secret_access_key: String,
}

#[derive(Debug, Deserialize)]
struct PolicyArnResponse {
    arn: String,
}

#[derive(Debug, Deserialize)]
struct ListObjectsResponse {
    keys: Vec<String>,
}

impl AdminClient {
    /// Build a client for the given endpoints, trusting `ca_cert` when the
    /// endpoints use TLS with a private authority.
    pub fn new(
        endpoint: impl Into<String>,
        iam_endpoint: impl Into<String>,
        credential: Credential,
        ca_cert: Option<&Path>,
    ) -> HarnessResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(ca_cert) = ca_cert {
            let pem = std::fs::read(ca_cert)?;
            let cert = reqwest::Certificate::from_pem(&pem)?;
            builder = builder.add_root_certificate(cert);
        }
        Ok(Self {
            http: builder.build()?,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            iam_endpoint: iam_endpoint.into().trim_end_matches('/').to_string(),
            credential,
        })
    }

    /// A clone of this client bound to a different credential.
    pub fn with_credential(&self, credential: Credential) -> Self {
        Self {
            credential,
            ..self.clone()
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn iam_endpoint(&self) -> &str {
        &self.iam_endpoint
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> HarnessResult<reqwest::Response> {
        let response = req
            .header(ACCESS_KEY_HEADER, self.credential.id.as_str())
            .header(SECRET_KEY_HEADER, self.credential.secret.as_str())
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(HarnessError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> HarnessResult<T> {
        Ok(self.send(req).await?.json().await?)
    }

    async fn send_empty(&self, req: reqwest::RequestBuilder) -> HarnessResult<()> {
        self.send(req).await.map(|_| ())
    }

    // ===== identity API =====

    /// Create a user, returning its name as confirmed by the server.
    pub async fn create_user(&self, name: &str) -> HarnessResult<String> {
        let response: UserResponse = self
            .send_json(
                self.http
                    .post(format!("{}/users", self.iam_endpoint))
                    .json(&serde_json::json!({ "user_name": name })),
            )
            .await?;
        Ok(response.user_name)
    }

    pub async fn delete_user(&self, name: &str) -> HarnessResult<()> {
        self.send_empty(
            self.http
                .delete(format!("{}/users/{name}", self.iam_endpoint)),
        )
        .await
    }

    /// Issue an access key for `user`.
    pub async fn create_access_key(&self, user: &str) -> HarnessResult<Credential> {
        let key: AccessKeyResponse = self
            .send_json(
                self.http
                    .post(format!("{}/users/{user}/keys", self.iam_endpoint)),
            )
            .await?;
        Ok(Credential::new(
            key.access_key_id,
            key.secret_access_key,
            user,
        ))
    }

    pub async fn put_user_policy(
        &self,
        user: &str,
        policy_name: &str,
        document: &PolicyDocument,
    ) -> HarnessResult<()> {
        self.send_empty(
            self.http
                .put(format!(
                    "{}/users/{user}/policies/{policy_name}",
                    self.iam_endpoint
                ))
                .json(document),
        )
        .await
    }

    pub async fn delete_user_policy(&self, user: &str, policy_name: &str) -> HarnessResult<()> {
        self.send_empty(self.http.delete(format!(
            "{}/users/{user}/policies/{policy_name}",
            self.iam_endpoint
        )))
        .await
    }

    /// Create a managed policy, returning its ARN.
    pub async fn create_policy(
        &self,
        name: &str,
        document: &PolicyDocument,
    ) -> HarnessResult<String> {
        let response: PolicyArnResponse = self
            .send_json(
                self.http
                    .post(format!("{}/policies", self.iam_endpoint))
                    .json(&serde_json::json!({
                        "policy_name": name,
                        "document": document,
                    })),
            )
            .await?;
        Ok(response.arn)
    }

    pub async fn attach_user_policy(&self, user: &str, policy_arn: &str) -> HarnessResult<()> {
        self.send_empty(
            self.http
                .post(format!(
                    "{}/users/{user}/attached-policies",
                    self.iam_endpoint
                ))
                .json(&serde_json::json!({ "policy_arn": policy_arn })),
        )
        .await
    }

    // ===== storage API =====

    pub async fn create_bucket(&self, bucket: &str) -> HarnessResult<()> {
        self.send_empty(self.http.put(format!("{}/buckets/{bucket}", self.endpoint)))
            .await
    }

    pub async fn delete_bucket(&self, bucket: &str) -> HarnessResult<()> {
        self.send_empty(
            self.http
                .delete(format!("{}/buckets/{bucket}", self.endpoint)),
        )
        .await
    }

    pub async fn put_bucket_versioning(&self, bucket: &str, enabled: bool) -> HarnessResult<()> {
        self.send_empty(
            self.http
                .put(format!("{}/buckets/{bucket}/versioning", self.endpoint))
                .json(&serde_json::json!({ "enabled": enabled })),
        )
        .await
    }

    // ===== control API =====

    pub async fn health(&self) -> HarnessResult<()> {
        self.send_empty(self.http.get(format!("{}/health", self.endpoint)))
            .await
    }

    /// Wipe the whole backend.
    pub async fn reset(&self) -> HarnessResult<()> {
        self.send_empty(self.http.post(format!("{}/reset", self.iam_endpoint)))
            .await
    }

    /// Set the auth-grace counter: `Some(n)` enforces after `n` more
    /// requests, `None` disables enforcement.
    pub async fn reset_auth(&self, remaining: Option<u64>) -> HarnessResult<()> {
        let body = match remaining {
            Some(n) => n.to_string(),
            None => "inf".to_string(),
        };
        self.send_empty(
            self.http
                .post(format!("{}/reset-auth", self.iam_endpoint))
                .body(body),
        )
        .await
    }

    /// Arm the request throttle: serve `remaining` more requests, then start
    /// refusing. Negative disables.
    pub async fn set_rate_limit(&self, remaining: i64) -> HarnessResult<()> {
        self.send_empty(
            self.http
                .post(format!("{}/rate_limit", self.endpoint))
                .body(remaining.to_string()),
        )
        .await
    }
}

#[async_trait]
impl ObjectAccess for AdminClient {
    async fn list_objects(&self, bucket: &str) -> HarnessResult<Vec<String>> {
        let response: ListObjectsResponse = self
            .send_json(
                self.http
                    .get(format!("{}/buckets/{bucket}/objects", self.endpoint)),
            )
            .await?;
        Ok(response.keys)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> HarnessResult<Bytes> {
        Ok(self
            .send(
                self.http
                    .get(format!("{}/buckets/{bucket}/objects/{key}", self.endpoint)),
            )
            .await?
            .bytes()
            .await?)
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> HarnessResult<()> {
        self.send_empty(
            self.http
                .put(format!("{}/buckets/{bucket}/objects/{key}", self.endpoint))
                .body(body),
        )
        .await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> HarnessResult<()> {
        self.send_empty(
            self.http
                .delete(format!("{}/buckets/{bucket}/objects/{key}", self.endpoint)),
        )
        .await
    }
}
