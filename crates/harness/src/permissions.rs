//! Permission escalation state machine for the mock identity backend.
//!
//! A freshly started mock server accepts every request. The controller
//! upgrades it to access-controlled mode: on the first escalation it creates
//! an administrative identity and the canned policy documents, rebinds its
//! client to the new admin credential, and only then tells the server to
//! start enforcing. Already-issued credentials keep working because
//! enforcement is a server-side switch, not a re-issue.
//!
//! Transitions are not transactional: a crash between the identity calls and
//! the enforcement switch leaves the server and the cached state
//! inconsistent. Acceptable for a test harness.

use crate::client::AdminClient;
use crate::error::{HarnessError, HarnessResult};
use shoal_core::{Credential, PolicyDocument, Statement};

/// Inline policy name used for per-bucket grants.
const BUCKET_POLICY_NAME: &str = "bucket";

/// Name of the administrative identity and its managed policy.
const ADMIN_NAME: &str = "admin";

/// Controller for one mock server's enforcement mode.
pub struct PermissionController {
    client: AdminClient,
    enforcing: bool,
    admin: Option<Credential>,
    read_only_policy: Option<PolicyDocument>,
    read_write_policy: Option<PolicyDocument>,
}

impl PermissionController {
    /// Wrap a client bound to the permissive default credential.
    pub fn new(client: AdminClient) -> Self {
        Self {
            client,
            enforcing: false,
            admin: None,
            read_only_policy: None,
            read_write_policy: None,
        }
    }

    /// Whether enforcement is currently engaged.
    pub fn enforcing(&self) -> bool {
        self.enforcing
    }

    /// The current administrative client: bound to the default credential
    /// until the first escalation, to the admin credential afterwards.
    pub fn client(&self) -> &AdminClient {
        &self.client
    }

    /// Engage or disengage permission enforcement. No-op when already in the
    /// requested state.
    pub async fn set_enforcing(&mut self, enforcing: bool) -> HarnessResult<()> {
        if enforcing == self.enforcing {
            return Ok(());
        }
        if enforcing {
            if self.admin.is_none() {
                self.escalate().await?;
            }
            // Zero remaining requests: enforce immediately.
            self.client.reset_auth(Some(0)).await?;
        } else {
            self.client.reset_auth(None).await?;
        }
        self.enforcing = enforcing;
        tracing::info!(enforcing, "permission enforcement toggled");
        Ok(())
    }

    /// First transition into enforcing mode: build the admin identity and
    /// the canned policy documents, then rebind the client.
    async fn escalate(&mut self) -> HarnessResult<()> {
        let admin_document = PolicyDocument::new(vec![Statement::allow(&["storage:*", "iam:*"])]);
        let arn = self.client.create_policy(ADMIN_NAME, &admin_document).await?;
        self.client.create_user(ADMIN_NAME).await?;
        let admin = self.client.create_access_key(ADMIN_NAME).await?;
        self.client.attach_user_policy(ADMIN_NAME, &arn).await?;

        self.read_only_policy = Some(PolicyDocument::new(vec![Statement::allow(&[
            "storage:List*",
            "storage:Get*",
        ])]));
        self.read_write_policy =
            Some(PolicyDocument::new(vec![Statement::allow(&["storage:*"])]));

        self.client = self.client.with_credential(admin.clone());
        self.admin = Some(admin);
        tracing::info!("created admin identity for permission enforcement");
        Ok(())
    }

    /// Create a user and issue it an access key, for per-bucket identities.
    pub async fn create_bucket_user(&self, name: &str) -> HarnessResult<Credential> {
        self.client.create_user(name).await?;
        self.client.create_access_key(name).await
    }

    /// Grant or revoke bucket access for a non-administrative credential.
    ///
    /// `read == false` removes the credential's policy entirely; otherwise
    /// the read-only or read-write document is attached depending on
    /// `write`.
    pub async fn grant_bucket_access(
        &self,
        credential: &Credential,
        read: bool,
        write: bool,
    ) -> HarnessResult<()> {
        if !self.enforcing {
            return Err(HarnessError::PreconditionViolated(
                "granting bucket access requires enforcing mode".to_string(),
            ));
        }
        if credential.is_fixture_default()
            || self.admin.as_ref().is_some_and(|a| a.id == credential.id)
        {
            return Err(HarnessError::PreconditionViolated(
                "cannot change access of the default or admin credential".to_string(),
            ));
        }

        let user = &credential.display_name;
        if !read {
            self.client.delete_user_policy(user, BUCKET_POLICY_NAME).await?;
            tracing::debug!(%user, "bucket access revoked");
            return Ok(());
        }
        let document = if write {
            self.read_write_policy.as_ref()
        } else {
            self.read_only_policy.as_ref()
        }
        .ok_or_else(|| {
            HarnessError::PreconditionViolated(
                "enforcement engaged without policy documents".to_string(),
            )
        })?;
        self.client
            .put_user_policy(user, BUCKET_POLICY_NAME, document)
            .await?;
        tracing::debug!(%user, write, "bucket access granted");
        Ok(())
    }

    /// Called after a full backend reset wiped the identity subsystem.
    ///
    /// The admin identity no longer exists server-side, so the cached
    /// credential is dropped and the client rebinds to the default; the next
    /// escalation rebuilds identity state from scratch.
    pub fn notify_backend_reset(&mut self) {
        self.enforcing = false;
        self.admin = None;
        self.client = self.client.with_credential(Credential::fixture_default());
    }
}
