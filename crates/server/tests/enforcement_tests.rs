//! Auth-grace counting and permission enforcement.

mod common;

use axum::http::{Method, StatusCode};
use common::{json, TestServer, IDENTITY_HOST, STORAGE_HOST};
use shoal_core::{PolicyDocument, Statement};
use shoal_server::iam::AccessKey;

#[derive(serde::Deserialize)]
struct KeyResponse {
    access_key_id: String,
    secret_access_key: String,
}

#[derive(serde::Deserialize)]
struct ArnResponse {
    arn: String,
}

/// Create a user with an inline policy and return its key pair.
async fn provision_user(server: &TestServer, name: &str, patterns: &[&str]) -> AccessKey {
    let (status, _) = server
        .send_json(
            Method::POST,
            IDENTITY_HOST,
            "/users",
            &serde_json::json!({"user_name": name}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = server
        .send(Method::POST, IDENTITY_HOST, &format!("/users/{name}/keys"))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let key: KeyResponse = json(&body);

    let doc = PolicyDocument::new(vec![Statement::allow(patterns)]);
    let (status, _) = server
        .send_json(
            Method::PUT,
            IDENTITY_HOST,
            &format!("/users/{name}/policies/bucket"),
            &doc,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    AccessKey {
        access_key_id: key.access_key_id,
        secret_access_key: key.secret_access_key,
    }
}

#[tokio::test]
async fn grace_counter_delays_enforcement() {
    let server = TestServer::new();
    server.send(Method::PUT, STORAGE_HOST, "/buckets/b").await;

    let (status, _) = server
        .send_bytes(Method::POST, STORAGE_HOST, "/reset-auth", "2")
        .await;
    assert_eq!(status, StatusCode::OK);

    // Two more anonymous requests pass, then enforcement begins.
    for _ in 0..2 {
        let (status, _) = server
            .send(Method::GET, STORAGE_HOST, "/buckets/b/objects")
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = server
        .send(Method::GET, STORAGE_HOST, "/buckets/b/objects")
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn enforcement_validates_keys_and_policies() {
    let server = TestServer::new();
    server.send(Method::PUT, STORAGE_HOST, "/buckets/b").await;
    server
        .send_bytes(Method::PUT, STORAGE_HOST, "/buckets/b/objects/k", "v")
        .await;

    let reader = provision_user(&server, "reader", &["storage:List*", "storage:Get*"]).await;
    let writer = provision_user(&server, "writer", &["storage:*"]).await;

    let (status, _) = server
        .send_bytes(Method::POST, STORAGE_HOST, "/reset-auth", "0")
        .await;
    assert_eq!(status, StatusCode::OK);

    // Anonymous and bogus credentials are rejected outright.
    let (status, _) = server
        .send(Method::GET, STORAGE_HOST, "/buckets/b/objects")
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = server
        .send_authed::<()>(
            Method::GET,
            STORAGE_HOST,
            "/buckets/b/objects",
            "awd",
            "awd",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The reader may list and get but not put.
    let (status, _) = server
        .send_authed::<()>(
            Method::GET,
            STORAGE_HOST,
            "/buckets/b/objects/k",
            &reader.access_key_id,
            &reader.secret_access_key,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = server
        .send_authed::<()>(
            Method::PUT,
            STORAGE_HOST,
            "/buckets/b/objects/k2",
            &reader.access_key_id,
            &reader.secret_access_key,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The writer may do both.
    let (status, _) = server
        .send_authed::<()>(
            Method::PUT,
            STORAGE_HOST,
            "/buckets/b/objects/k2",
            &writer.access_key_id,
            &writer.secret_access_key,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Identity operations need an iam-capable credential too.
    let (status, _) = server
        .send_authed(
            Method::POST,
            IDENTITY_HOST,
            "/users",
            &writer.access_key_id,
            &writer.secret_access_key,
            Some(&serde_json::json!({"user_name": "late"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn attached_admin_policy_grants_identity_access() {
    let server = TestServer::new();

    let doc = PolicyDocument::new(vec![Statement::allow(&["storage:*", "iam:*"])]);
    let (status, body) = server
        .send_json(
            Method::POST,
            IDENTITY_HOST,
            "/policies",
            &serde_json::json!({"policy_name": "admin", "document": doc}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let arn: ArnResponse = json(&body);

    server
        .send_json(
            Method::POST,
            IDENTITY_HOST,
            "/users",
            &serde_json::json!({"user_name": "admin"}),
        )
        .await;
    let (_, body) = server
        .send(Method::POST, IDENTITY_HOST, "/users/admin/keys")
        .await;
    let key: KeyResponse = json(&body);
    let (status, _) = server
        .send_json(
            Method::POST,
            IDENTITY_HOST,
            "/users/admin/attached-policies",
            &serde_json::json!({"policy_arn": arn.arn}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    server
        .send_bytes(Method::POST, STORAGE_HOST, "/reset-auth", "0")
        .await;

    // The admin can keep managing identities and buckets under enforcement.
    let (status, _) = server
        .send_authed(
            Method::POST,
            IDENTITY_HOST,
            "/users",
            &key.access_key_id,
            &key.secret_access_key,
            Some(&serde_json::json!({"user_name": "worker"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = server
        .send_authed::<()>(
            Method::PUT,
            STORAGE_HOST,
            "/buckets/fresh",
            &key.access_key_id,
            &key.secret_access_key,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // Disengaging enforcement restores anonymous access.
    let (status, _) = server
        .send_bytes(Method::POST, STORAGE_HOST, "/reset-auth", "inf")
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = server
        .send(Method::GET, STORAGE_HOST, "/buckets/fresh/objects")
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn deleting_the_inline_policy_revokes_access() {
    let server = TestServer::new();
    server.send(Method::PUT, STORAGE_HOST, "/buckets/b").await;
    let key = provision_user(&server, "worker", &["storage:*"]).await;

    server
        .send_bytes(Method::POST, STORAGE_HOST, "/reset-auth", "0")
        .await;

    let (status, _) = server
        .send_authed::<()>(
            Method::GET,
            STORAGE_HOST,
            "/buckets/b/objects",
            &key.access_key_id,
            &key.secret_access_key,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Revoke by deleting the inline policy. The delete itself requires an
    // identity credential, which the worker does not hold.
    let (status, _) = server
        .send_authed::<()>(
            Method::DELETE,
            IDENTITY_HOST,
            "/users/worker/policies/bucket",
            &key.access_key_id,
            &key.secret_access_key,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Drop enforcement, delete the policy, re-enforce: access is gone.
    server
        .send_bytes(Method::POST, STORAGE_HOST, "/reset-auth", "inf")
        .await;
    let (status, _) = server
        .send(Method::DELETE, IDENTITY_HOST, "/users/worker/policies/bucket")
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    server
        .send_bytes(Method::POST, STORAGE_HOST, "/reset-auth", "0")
        .await;

    let (status, _) = server
        .send_authed::<()>(
            Method::GET,
            STORAGE_HOST,
            "/buckets/b/objects",
            &key.access_key_id,
            &key.secret_access_key,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
