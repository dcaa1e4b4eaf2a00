//! Represents an object (blob) stored in the bucket, as seen by the gateway.

use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Prefix under which custom metadata travels as request/response headers.
pub const CUSTOM_METADATA_PREFIX: &str = "x-amz-meta-";

/// HTTP metadata captured from the upload request and replayed on `HEAD`.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    /// Raw `Expires` value as sent by the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_expiry: Option<String>,
}

impl HttpMetadata {
    /// Pick the storable HTTP metadata out of a request's headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };

        Self {
            content_type: get(header::CONTENT_TYPE),
            content_language: get(header::CONTENT_LANGUAGE),
            content_disposition: get(header::CONTENT_DISPOSITION),
            content_encoding: get(header::CONTENT_ENCODING),
            cache_control: get(header::CACHE_CONTROL),
            cache_expiry: get(header::EXPIRES),
        }
    }

    /// Write every stored field back out as a response header.
    ///
    /// Values that are no longer valid header values are skipped.
    pub fn write_headers(&self, headers: &mut HeaderMap) {
        let pairs = [
            (header::CONTENT_TYPE, &self.content_type),
            (header::CONTENT_LANGUAGE, &self.content_language),
            (header::CONTENT_DISPOSITION, &self.content_disposition),
            (header::CONTENT_ENCODING, &self.content_encoding),
            (header::CACHE_CONTROL, &self.cache_control),
            (header::EXPIRES, &self.cache_expiry),
        ];

        for (name, value) in pairs {
            if let Some(value) = value.as_deref() {
                if let Ok(value) = HeaderValue::from_str(value) {
                    headers.insert(name, value);
                }
            }
        }
    }
}

/// Collect `x-amz-meta-*` request headers into a custom metadata map.
pub fn custom_metadata_from_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(CUSTOM_METADATA_PREFIX)?;
            let value = value.to_str().ok()?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Byte range actually served by a partial read.
///
/// `end` is inclusive and left unset when the request was open-ended.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectRange {
    pub offset: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<u64>,
}

impl ObjectRange {
    /// Last byte position of the range for an object of `size` bytes.
    pub fn last_byte(&self, size: u64) -> u64 {
        self.end.unwrap_or_else(|| size.saturating_sub(1))
    }

    /// Number of bytes covered by the range.
    pub fn len(&self, size: u64) -> u64 {
        (self.last_byte(size) + 1).saturating_sub(self.offset)
    }
}

/// Metadata describing a single stored object.
///
/// Built fresh from the backend on every request; never cached.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDescriptor {
    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Size in bytes.
    pub size: u64,

    /// MD5 of the content, lowercase hex.
    pub etag: String,

    /// The etag wrapped in double quotes, ready for an `ETag` header.
    pub http_etag: String,

    /// When the current version was written.
    pub uploaded: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_metadata: Option<HttpMetadata>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_metadata: Option<BTreeMap<String, String>>,

    /// Set only when a ranged read was served.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<ObjectRange>,
}

impl ObjectDescriptor {
    pub fn new(key: impl Into<String>, size: u64, etag: impl Into<String>, uploaded: DateTime<Utc>) -> Self {
        let etag = etag.into();
        Self {
            key: key.into(),
            size,
            http_etag: format!("\"{}\"", etag),
            etag,
            uploaded,
            http_metadata: None,
            custom_metadata: None,
            range: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_etag_is_quoted() {
        let desc = ObjectDescriptor::new("a.txt", 3, "abc", Utc::now());
        assert_eq!(desc.http_etag, "\"abc\"");
    }

    #[test]
    fn range_defaults_end_to_last_byte() {
        let open = ObjectRange { offset: 4, end: None };
        assert_eq!(open.last_byte(10), 9);
        assert_eq!(open.len(10), 6);

        let closed = ObjectRange { offset: 0, end: Some(4) };
        assert_eq!(closed.len(10), 5);
    }

    #[test]
    fn metadata_round_trips_through_headers() {
        let mut req = HeaderMap::new();
        req.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        req.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=60"));
        req.insert("x-amz-meta-owner", HeaderValue::from_static("alice"));

        let meta = HttpMetadata::from_headers(&req);
        assert_eq!(meta.content_type.as_deref(), Some("text/plain"));
        assert_eq!(meta.content_language, None);

        let mut out = HeaderMap::new();
        meta.write_headers(&mut out);
        assert_eq!(out.get(header::CACHE_CONTROL).unwrap(), "max-age=60");
        assert!(out.get(header::CONTENT_LANGUAGE).is_none());

        let custom = custom_metadata_from_headers(&req);
        assert_eq!(custom.get("owner").map(String::as_str), Some("alice"));
        assert_eq!(custom.len(), 1);
    }
}
