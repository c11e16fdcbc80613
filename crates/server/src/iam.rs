//! In-memory identity backend and its handlers.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use shoal_core::PolicyDocument;
use std::collections::HashMap;
use uuid::Uuid;

/// An issued access key pair.
#[derive(Clone, Debug, Serialize)]
pub struct AccessKey {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// One identity: its keys plus inline and attached policies.
#[derive(Clone, Debug, Default)]
pub struct UserRecord {
    pub user_id: String,
    pub access_keys: Vec<AccessKey>,
    /// Inline policies by policy name.
    pub inline_policies: HashMap<String, PolicyDocument>,
    pub attached_policy_arns: Vec<String>,
}

/// A managed policy created through `/policies`.
#[derive(Clone, Debug)]
pub struct ManagedPolicy {
    pub arn: String,
    pub document: PolicyDocument,
}

/// The whole identity backend.
#[derive(Clone, Debug, Default)]
pub struct IamState {
    pub users: HashMap<String, UserRecord>,
    /// Managed policies by name.
    pub policies: HashMap<String, ManagedPolicy>,
}

impl IamState {
    fn user_mut(&mut self, name: &str) -> ApiResult<&mut UserRecord> {
        self.users
            .get_mut(name)
            .ok_or_else(|| ApiError::NotFound(format!("user: {name}")))
    }

    /// Resolve an access key id to its owning user, checking the secret.
    pub fn authenticate(&self, access_key_id: &str, secret: &str) -> Option<(&str, &UserRecord)> {
        self.users.iter().find_map(|(name, user)| {
            user.access_keys
                .iter()
                .any(|k| k.access_key_id == access_key_id && k.secret_access_key == secret)
                .then_some((name.as_str(), user))
        })
    }

    /// Whether `user` may perform `action` under any of its policies.
    pub fn user_allows(&self, user: &UserRecord, action: &str) -> bool {
        let inline = user.inline_policies.values().any(|doc| doc.allows(action));
        if inline {
            return true;
        }
        user.attached_policy_arns.iter().any(|arn| {
            self.policies
                .values()
                .any(|p| p.arn == *arn && p.document.allows(action))
        })
    }
}

fn policy_arn(name: &str) -> String {
    format!("arn:shoal:iam::policy/{name}")
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateUserRequest {
    pub user_name: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UserResponse {
    pub user_id: String,
    pub user_name: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreatePolicyRequest {
    pub policy_name: String,
    pub document: PolicyDocument,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PolicyArnResponse {
    pub arn: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AttachPolicyRequest {
    pub policy_arn: String,
}

/// POST /users - Create a user.
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let mut backend = state.lock().await;
    if backend.iam.users.contains_key(&req.user_name) {
        return Err(ApiError::Conflict(format!("user exists: {}", req.user_name)));
    }
    let user_id = Uuid::new_v4().to_string();
    backend.iam.users.insert(
        req.user_name.clone(),
        UserRecord {
            user_id: user_id.clone(),
            ..UserRecord::default()
        },
    );
    tracing::debug!(user = %req.user_name, "user created");
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            user_id,
            user_name: req.user_name,
        }),
    ))
}

/// DELETE /users/{name} - Delete a user and everything issued to it.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    let mut backend = state.lock().await;
    if backend.iam.users.remove(&name).is_none() {
        return Err(ApiError::NotFound(format!("user: {name}")));
    }
    tracing::debug!(user = %name, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /users/{name}/keys - Issue an access key pair.
pub async fn create_access_key(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<(StatusCode, Json<AccessKey>)> {
    let mut backend = state.lock().await;
    let user = backend.iam.user_mut(&name)?;
    let key = AccessKey {
        access_key_id: format!("AK{}", Uuid::new_v4().simple().to_string().to_uppercase()),
        secret_access_key: Uuid::new_v4().simple().to_string(),
    };
    user.access_keys.push(key.clone());
    Ok((StatusCode::CREATED, Json(key)))
}

/// PUT /users/{name}/policies/{policy_name} - Put an inline policy.
///
/// Replaces any existing inline policy of the same name.
pub async fn put_user_policy(
    State(state): State<AppState>,
    Path((name, policy_name)): Path<(String, String)>,
    Json(document): Json<PolicyDocument>,
) -> ApiResult<StatusCode> {
    let mut backend = state.lock().await;
    backend
        .iam
        .user_mut(&name)?
        .inline_policies
        .insert(policy_name, document);
    Ok(StatusCode::OK)
}

/// DELETE /users/{name}/policies/{policy_name} - Remove an inline policy.
///
/// Idempotent with respect to the policy: only the user must exist.
pub async fn delete_user_policy(
    State(state): State<AppState>,
    Path((name, policy_name)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let mut backend = state.lock().await;
    backend
        .iam
        .user_mut(&name)?
        .inline_policies
        .remove(&policy_name);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /policies - Create a managed policy.
pub async fn create_policy(
    State(state): State<AppState>,
    Json(req): Json<CreatePolicyRequest>,
) -> ApiResult<(StatusCode, Json<PolicyArnResponse>)> {
    let mut backend = state.lock().await;
    if backend.iam.policies.contains_key(&req.policy_name) {
        return Err(ApiError::Conflict(format!(
            "policy exists: {}",
            req.policy_name
        )));
    }
    let arn = policy_arn(&req.policy_name);
    backend.iam.policies.insert(
        req.policy_name,
        ManagedPolicy {
            arn: arn.clone(),
            document: req.document,
        },
    );
    Ok((StatusCode::CREATED, Json(PolicyArnResponse { arn })))
}

/// POST /users/{name}/attached-policies - Attach a managed policy.
pub async fn attach_user_policy(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<AttachPolicyRequest>,
) -> ApiResult<StatusCode> {
    let mut backend = state.lock().await;
    let known = backend
        .iam
        .policies
        .values()
        .any(|p| p.arn == req.policy_arn);
    if !known {
        return Err(ApiError::NotFound(format!("policy: {}", req.policy_arn)));
    }
    let user = backend.iam.user_mut(&name)?;
    if !user.attached_policy_arns.contains(&req.policy_arn) {
        user.attached_policy_arns.push(req.policy_arn);
    }
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_core::{PolicyDocument, Statement};

    fn state_with_keyed_user(action_patterns: &[&str]) -> (IamState, AccessKey) {
        let mut iam = IamState::default();
        let key = AccessKey {
            access_key_id: "AKTEST".to_string(),
            secret_access_key: "sekrit".to_string(),
        };
        let mut user = UserRecord {
            user_id: "u-1".to_string(),
            ..UserRecord::default()
        };
        user.access_keys.push(key.clone());
        user.inline_policies.insert(
            "bucket".to_string(),
            PolicyDocument::new(vec![Statement::allow(action_patterns)]),
        );
        iam.users.insert("worker".to_string(), user);
        (iam, key)
    }

    #[test]
    fn authenticate_checks_both_halves_of_the_key() {
        let (iam, key) = state_with_keyed_user(&["storage:*"]);
        assert!(iam.authenticate(&key.access_key_id, &key.secret_access_key).is_some());
        assert!(iam.authenticate(&key.access_key_id, "wrong").is_none());
        assert!(iam.authenticate("unknown", &key.secret_access_key).is_none());
    }

    #[test]
    fn inline_policies_grant_access() {
        let (iam, key) = state_with_keyed_user(&["storage:Get*", "storage:List*"]);
        let (_, user) = iam
            .authenticate(&key.access_key_id, &key.secret_access_key)
            .unwrap();
        assert!(iam.user_allows(user, "storage:GetObject"));
        assert!(!iam.user_allows(user, "storage:PutObject"));
    }

    #[test]
    fn attached_policies_grant_access() {
        let mut iam = IamState::default();
        let arn = policy_arn("admin");
        iam.policies.insert(
            "admin".to_string(),
            ManagedPolicy {
                arn: arn.clone(),
                document: PolicyDocument::new(vec![Statement::allow(&["storage:*", "iam:*"])]),
            },
        );
        let mut user = UserRecord::default();
        user.attached_policy_arns.push(arn);
        assert!(iam.user_allows(&user, "iam:CreateUser"));
        assert!(iam.user_allows(&user, "storage:DeleteBucket"));
    }
}
