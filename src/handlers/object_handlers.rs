//! HTTP handlers for a single object at `/{key}`.
//! Streams object bodies in both directions and delegates storage concerns
//! to the `Bucket`.

use crate::{
    errors::AppError,
    handlers::{
        first_param,
        headers::{metadata_headers, object_headers},
    },
    models::object::{HttpMetadata, custom_metadata_from_headers},
    services::bucket::{BodyStream, GetOptions, PutOptions},
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::io;
use tracing::info;

#[derive(Debug, Default)]
pub struct ObjectQuery {
    /// Any non-empty value asks for `Content-Disposition: attachment`.
    pub attachment: Option<String>,
}

impl ObjectQuery {
    pub fn from_params(params: &[(String, String)]) -> Self {
        Self {
            attachment: first_param(params, "attachment").map(str::to_string),
        }
    }

    fn wants_attachment(&self) -> bool {
        self.attachment.as_deref().is_some_and(|v| !v.is_empty())
    }
}

/// The object key: the raw, undecoded request path minus its leading `/`.
pub fn object_key(uri: &Uri) -> &str {
    let path = uri.path();
    path.strip_prefix('/').unwrap_or(path)
}

/// Any method on `/{*key}`; dispatches on the method.
pub async fn handle_object(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    let key = object_key(&uri);
    let query = ObjectQuery::from_params(&params);
    info!("{} object {}: {}", method, key, uri);

    match method {
        Method::OPTIONS => Ok("ok".into_response()),
        Method::HEAD => head_object(&state, key).await,
        Method::GET => get_object(&state, key, &query, &headers).await,
        Method::PUT | Method::POST => put_object(&state, key, &headers, body).await,
        Method::DELETE => delete_object(&state, key).await,
        _ => Err(AppError::unsupported_method()),
    }
}

/// HEAD — stored metadata as headers, no body.
async fn head_object(state: &AppState, key: &str) -> Result<Response, AppError> {
    let meta = state
        .bucket
        .head(key)
        .await?
        .ok_or_else(|| AppError::not_found(key))?;

    let mut response = Response::new(Body::empty());
    *response.headers_mut() = metadata_headers(&meta);
    Ok(response)
}

/// GET — full, partial or not-modified read.
///
/// Range and conditional headers are handed to the bucket untouched; the
/// status is derived from what comes back.
async fn get_object(
    state: &AppState,
    key: &str,
    query: &ObjectQuery,
    headers: &HeaderMap,
) -> Result<Response, AppError> {
    let options = GetOptions::from_headers(headers);
    let ranged = options.range.is_some();

    let object = state
        .bucket
        .get(key, options)
        .await?
        .ok_or_else(|| AppError::not_found(key))?;

    let resp_headers = object_headers(&object.meta, query.wants_attachment());
    let (status, body) = match object.body {
        Some(stream) if ranged => (StatusCode::PARTIAL_CONTENT, Body::from_stream(stream)),
        Some(stream) => (StatusCode::OK, Body::from_stream(stream)),
        None => (StatusCode::NOT_MODIFIED, Body::empty()),
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = resp_headers;
    Ok(response)
}

/// PUT/POST — store the request body under `key`.
async fn put_object(
    state: &AppState,
    key: &str,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    if state.config.is_protected(key) {
        return Err(AppError::forbidden());
    }

    let stream: BodyStream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other))
        .boxed();
    let options = PutOptions {
        http_metadata: HttpMetadata::from_headers(headers),
        custom_metadata: custom_metadata_from_headers(headers),
    };

    let object = state.bucket.put(key, stream, options).await?;

    let mut response = key.to_string().into_response();
    if let Ok(etag) = HeaderValue::from_str(&object.http_etag) {
        response.headers_mut().insert(header::ETAG, etag);
    }
    Ok(response)
}

/// DELETE — remove `key`; missing keys still answer `deleted`.
async fn delete_object(state: &AppState, key: &str) -> Result<Response, AppError> {
    if state.config.is_protected(key) {
        return Err(AppError::forbidden());
    }

    state.bucket.delete(key).await?;
    Ok("deleted".into_response())
}
