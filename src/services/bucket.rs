//! The storage seam: everything the gateway and sweeper need from a bucket.

use crate::models::{
    listing::{ListOptions, Listing},
    object::{HttpMetadata, ObjectDescriptor},
};
use crate::services::conditional::Preconditions;
use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use bytes::Bytes;
use futures::stream::BoxStream;
use std::{collections::BTreeMap, io};
use thiserror::Error;

/// Streamed object payload, in either direction.
pub type BodyStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error("range `{range}` not satisfiable for object `{key}` of {size} bytes")]
    RangeNotSatisfiable { key: String, range: String, size: u64 },
    #[error("corrupt metadata for object `{key}`: {source}")]
    Metadata {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Read options forwarded verbatim from the incoming request.
#[derive(Clone, Debug, Default)]
pub struct GetOptions {
    /// Raw `Range` header value.
    pub range: Option<String>,
    pub only_if: Preconditions,
}

impl GetOptions {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            range: headers
                .get(header::RANGE)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string()),
            only_if: Preconditions::from_headers(headers),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PutOptions {
    pub http_metadata: HttpMetadata,
    pub custom_metadata: BTreeMap<String, String>,
}

/// Result of a `get`: the descriptor plus a body unless a precondition
/// short-circuited the read.
pub struct StoredObject {
    pub meta: ObjectDescriptor,
    pub body: Option<BodyStream>,
}

/// A single bucket of key-addressed blobs.
///
/// Implementations own consistency: a completed `put` must be visible to
/// every later `get`, and `delete` of a missing key succeeds.
#[async_trait]
pub trait Bucket: Send + Sync {
    async fn list(&self, options: ListOptions) -> StorageResult<Listing>;

    async fn head(&self, key: &str) -> StorageResult<Option<ObjectDescriptor>>;

    /// Fetch an object, evaluating `options.only_if` and `options.range`
    /// against its current state.
    async fn get(&self, key: &str, options: GetOptions) -> StorageResult<Option<StoredObject>>;

    async fn put(&self, key: &str, body: BodyStream, options: PutOptions)
    -> StorageResult<ObjectDescriptor>;

    async fn delete(&self, key: &str) -> StorageResult<()>;
}
