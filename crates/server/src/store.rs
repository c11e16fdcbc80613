//! In-memory object-storage backend and its handlers.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One stored object. When bucket versioning is enabled, overwritten
/// payloads are retained in `history` (oldest first).
#[derive(Clone, Debug, Default)]
pub struct ObjectRecord {
    pub data: Bytes,
    pub history: Vec<Bytes>,
}

/// One bucket: a flat, ordered key space.
#[derive(Clone, Debug, Default)]
pub struct BucketState {
    pub versioning: bool,
    pub objects: BTreeMap<String, ObjectRecord>,
}

/// The whole storage backend.
#[derive(Clone, Debug, Default)]
pub struct StoreState {
    pub buckets: HashMap<String, BucketState>,
}

impl StoreState {
    fn bucket_mut(&mut self, name: &str) -> ApiResult<&mut BucketState> {
        self.buckets
            .get_mut(name)
            .ok_or_else(|| ApiError::NotFound(format!("bucket: {name}")))
    }

    fn bucket(&self, name: &str) -> ApiResult<&BucketState> {
        self.buckets
            .get(name)
            .ok_or_else(|| ApiError::NotFound(format!("bucket: {name}")))
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct VersioningRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ListObjectsResponse {
    pub keys: Vec<String>,
}

/// PUT /buckets/{bucket} - Create a bucket.
pub async fn create_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> ApiResult<StatusCode> {
    let mut backend = state.lock().await;
    if backend.store.buckets.contains_key(&bucket) {
        return Err(ApiError::Conflict(format!("bucket exists: {bucket}")));
    }
    backend
        .store
        .buckets
        .insert(bucket.clone(), BucketState::default());
    tracing::debug!(%bucket, "bucket created");
    Ok(StatusCode::CREATED)
}

/// DELETE /buckets/{bucket} - Delete an empty bucket.
pub async fn delete_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> ApiResult<StatusCode> {
    let mut backend = state.lock().await;
    if !backend.store.bucket(&bucket)?.objects.is_empty() {
        return Err(ApiError::Conflict(format!("bucket not empty: {bucket}")));
    }
    backend.store.buckets.remove(&bucket);
    tracing::debug!(%bucket, "bucket deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /buckets/{bucket}/versioning - Toggle bucket versioning.
pub async fn put_bucket_versioning(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Json(req): Json<VersioningRequest>,
) -> ApiResult<StatusCode> {
    let mut backend = state.lock().await;
    backend.store.bucket_mut(&bucket)?.versioning = req.enabled;
    Ok(StatusCode::OK)
}

/// GET /buckets/{bucket}/objects - List object keys.
pub async fn list_objects(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> ApiResult<Json<ListObjectsResponse>> {
    let backend = state.lock().await;
    let keys = backend
        .store
        .bucket(&bucket)?
        .objects
        .keys()
        .cloned()
        .collect();
    Ok(Json(ListObjectsResponse { keys }))
}

/// PUT /buckets/{bucket}/objects/{key} - Store an object.
pub async fn put_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let mut backend = state.lock().await;
    let bucket_state = backend.store.bucket_mut(&bucket)?;
    let versioning = bucket_state.versioning;
    let record = bucket_state.objects.entry(key).or_default();
    if versioning && !record.data.is_empty() {
        let previous = std::mem::take(&mut record.data);
        record.history.push(previous);
    }
    record.data = body;
    Ok(StatusCode::OK)
}

/// GET /buckets/{bucket}/objects/{key} - Fetch an object.
pub async fn get_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> ApiResult<Bytes> {
    let backend = state.lock().await;
    let record = backend
        .store
        .bucket(&bucket)?
        .objects
        .get(&key)
        .ok_or_else(|| ApiError::NotFound(format!("object: {bucket}/{key}")))?;
    Ok(record.data.clone())
}

/// DELETE /buckets/{bucket}/objects/{key} - Remove an object.
///
/// Idempotent: deleting a missing key succeeds, matching the storage
/// services this backend stands in for.
pub async fn delete_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let mut backend = state.lock().await;
    backend.store.bucket_mut(&bucket)?.objects.remove(&key);
    Ok(StatusCode::NO_CONTENT)
}
