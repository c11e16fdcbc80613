//! Permission escalation, grants and de-escalation against a live backend.

mod common;

use bytes::Bytes;
use common::InProcessServer;
use shoal_harness::{HarnessError, ObjectAccess};

#[tokio::test]
async fn escalation_is_idempotent_and_lazy() {
    let server = InProcessServer::start().await;
    let mut registry = server.registry();

    assert!(!registry.permissions().enforcing());
    registry.permissions_mut().set_enforcing(true).await.unwrap();
    assert!(registry.permissions().enforcing());

    // A second engage is a no-op; re-running the escalation would collide
    // with the admin identity that already exists.
    registry.permissions_mut().set_enforcing(true).await.unwrap();

    // Toggling off and on again must reuse the existing admin identity.
    registry.permissions_mut().set_enforcing(false).await.unwrap();
    assert!(!registry.permissions().enforcing());
    registry.permissions_mut().set_enforcing(true).await.unwrap();
    assert!(registry.permissions().enforcing());
}

#[tokio::test]
async fn enforcing_mode_issues_per_bucket_credentials() {
    let server = InProcessServer::start().await;
    let mut registry = server.registry();

    registry.permissions_mut().set_enforcing(true).await.unwrap();
    let entry = registry.create_bucket(false).await.unwrap();

    assert!(!entry.credential.is_fixture_default());
    assert_eq!(entry.credential.display_name, "test_bucket_0_user");
    assert_eq!(entry.descriptor.access, entry.credential.id);
}

#[tokio::test]
async fn grants_escalate_and_revoke_cleanly() {
    let server = InProcessServer::start().await;
    let mut registry = server.registry();

    registry.permissions_mut().set_enforcing(true).await.unwrap();
    let entry = registry.create_bucket(false).await.unwrap();
    let bucket_client = server.client_for(entry.credential.clone());

    // A fresh per-bucket credential starts with no policy at all.
    assert!(matches!(
        bucket_client.list_objects(&entry.bucket).await,
        Err(HarnessError::Api { status: 403, .. })
    ));

    // Read-only: list and get work, writes stay forbidden.
    registry.grant_access(&entry, true, false).await.unwrap();
    assert!(bucket_client.list_objects(&entry.bucket).await.unwrap().is_empty());
    assert!(matches!(
        bucket_client
            .put_object(&entry.bucket, "k", Bytes::from_static(b"x"))
            .await,
        Err(HarnessError::Api { status: 403, .. })
    ));

    // Read-write: writes work too.
    registry.grant_access(&entry, true, true).await.unwrap();
    bucket_client
        .put_object(&entry.bucket, "k", Bytes::from_static(b"x"))
        .await
        .unwrap();

    // Revoking removes the policy entirely.
    registry.grant_access(&entry, false, false).await.unwrap();
    assert!(matches!(
        bucket_client.list_objects(&entry.bucket).await,
        Err(HarnessError::Api { status: 403, .. })
    ));

    // A subsequent grant attaches fresh policy without resurrecting state.
    registry.grant_access(&entry, true, false).await.unwrap();
    assert_eq!(
        bucket_client.list_objects(&entry.bucket).await.unwrap(),
        vec!["k".to_string()]
    );
}

#[tokio::test]
async fn grants_require_enforcing_mode_and_a_non_admin_target() {
    let server = InProcessServer::start().await;
    let mut registry = server.registry();

    // Not enforcing yet: grants are a programmer error.
    let entry = registry.create_bucket(false).await.unwrap();
    assert!(matches!(
        registry.grant_access(&entry, true, true).await,
        Err(HarnessError::PreconditionViolated(_))
    ));

    // Enforcing, but the entry still holds the default credential.
    registry.permissions_mut().set_enforcing(true).await.unwrap();
    assert!(matches!(
        registry.grant_access(&entry, true, true).await,
        Err(HarnessError::PreconditionViolated(_))
    ));
}

#[tokio::test]
async fn de_escalation_restores_anonymous_access() {
    let server = InProcessServer::start().await;
    let client = server.admin_client();
    let mut registry = server.registry();

    registry.permissions_mut().set_enforcing(true).await.unwrap();
    let entry = registry.create_bucket(false).await.unwrap();

    // The permissive default credential is rejected while enforcing.
    assert!(matches!(
        client.list_objects(&entry.bucket).await,
        Err(HarnessError::Api { status: 401, .. })
    ));

    registry.permissions_mut().set_enforcing(false).await.unwrap();
    assert!(client.list_objects(&entry.bucket).await.unwrap().is_empty());
}

#[tokio::test]
async fn full_reset_clears_escalated_state() {
    let server = InProcessServer::start().await;
    let mut registry = server.registry();

    registry.permissions_mut().set_enforcing(true).await.unwrap();
    let entry = registry.create_bucket(false).await.unwrap();

    // Releasing the last bucket resets the backend; the controller follows.
    registry.release_bucket(&entry).await.unwrap();
    assert!(!registry.permissions().enforcing());

    // The next escalation rebuilds the admin identity from scratch.
    registry.permissions_mut().set_enforcing(true).await.unwrap();
    let fresh = registry.create_bucket(false).await.unwrap();
    assert!(!fresh.credential.is_fixture_default());
}
