//! Precondition and byte-range evaluation for reads.
//!
//! Both operate on the raw header values forwarded by the gateway so that the
//! backend stays the single place where freshness is decided.

use crate::models::object::{ObjectDescriptor, ObjectRange};
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};

/// Conditional request headers, kept verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Preconditions {
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
    pub if_unmodified_since: Option<String>,
}

impl Preconditions {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };

        Self {
            if_match: get("if-match"),
            if_none_match: get("if-none-match"),
            if_modified_since: get("if-modified-since"),
            if_unmodified_since: get("if-unmodified-since"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.if_match.is_none()
            && self.if_none_match.is_none()
            && self.if_modified_since.is_none()
            && self.if_unmodified_since.is_none()
    }

    /// Returns `true` when the body should be served.
    ///
    /// Evaluation order follows RFC 9110 §13.2.2:
    /// 1. If-Match
    /// 2. If-Unmodified-Since, only when If-Match is absent
    /// 3. If-None-Match
    /// 4. If-Modified-Since, only when If-None-Match is absent
    ///
    /// Dates compare at one-second granularity; unparseable dates are ignored.
    pub fn allows(&self, object: &ObjectDescriptor) -> bool {
        let uploaded = object.uploaded.timestamp();

        if let Some(if_match) = self.if_match.as_deref() {
            if !etag_list_matches(if_match, &object.etag) {
                return false;
            }
        } else if let Some(since) = self.if_unmodified_since.as_deref().and_then(parse_http_date) {
            if uploaded > since.timestamp() {
                return false;
            }
        }

        if let Some(if_none_match) = self.if_none_match.as_deref() {
            if etag_list_matches(if_none_match, &object.etag) {
                return false;
            }
        } else if let Some(since) = self.if_modified_since.as_deref().and_then(parse_http_date) {
            if uploaded <= since.timestamp() {
                return false;
            }
        }

        true
    }
}

/// Whether a comma-separated etag list (or `*`) names `etag`.
///
/// Weak validators compare by their opaque tag.
fn etag_list_matches(list: &str, etag: &str) -> bool {
    list.split(',')
        .map(|candidate| {
            let candidate = candidate.trim();
            let candidate = candidate.strip_prefix("W/").unwrap_or(candidate);
            candidate.trim_matches('"')
        })
        .any(|candidate| candidate == "*" || candidate == etag)
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    httpdate::parse_http_date(value.trim()).ok().map(DateTime::<Utc>::from)
}

/// A single `bytes=` range as requested by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteRange {
    /// bytes=start-end (inclusive)
    StartEnd(u64, u64),
    /// bytes=start-
    StartOpen(u64),
    /// bytes=-N (last N bytes)
    Suffix(u64),
}

impl ByteRange {
    /// Parse a `Range` header value. Multi-range requests are not supported.
    pub fn parse(value: &str) -> Option<Self> {
        let spec = value.trim().strip_prefix("bytes=")?.trim();
        if spec.contains(',') {
            return None;
        }

        let (start, end) = spec.split_once('-')?;
        match (start.trim(), end.trim()) {
            ("", "") => None,
            ("", suffix) => {
                let n: u64 = suffix.parse().ok()?;
                (n > 0).then_some(ByteRange::Suffix(n))
            }
            (start, "") => start.parse().ok().map(ByteRange::StartOpen),
            (start, end) => {
                let start: u64 = start.parse().ok()?;
                let end: u64 = end.parse().ok()?;
                (start <= end).then_some(ByteRange::StartEnd(start, end))
            }
        }
    }

    /// Resolve against an object of `size` bytes.
    ///
    /// Returns `None` when unsatisfiable. Open-ended and suffix ranges leave
    /// `end` unset; explicit ends are clamped to the last byte.
    pub fn resolve(self, size: u64) -> Option<ObjectRange> {
        if size == 0 {
            return None;
        }
        match self {
            ByteRange::StartEnd(start, end) => (start < size).then(|| ObjectRange {
                offset: start,
                end: Some(end.min(size - 1)),
            }),
            ByteRange::StartOpen(start) => {
                (start < size).then_some(ObjectRange { offset: start, end: None })
            }
            ByteRange::Suffix(n) => Some(ObjectRange {
                offset: size - n.min(size),
                end: None,
            }),
        }
    }
}
