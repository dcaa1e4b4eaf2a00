//! Translates object descriptors into outbound response headers.
//!
//! Everything here is a pure function of the descriptor; no I/O.

use crate::models::object::{CUSTOM_METADATA_PREFIX, ObjectDescriptor};
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use std::{borrow::Cow, time::SystemTime};

const OCTET_STREAM: &str = "application/octet-stream";

enum MimeRule {
    Fixed(&'static str),
    /// `image/{extension}`, extension as typed in the filename.
    Image,
}

/// Suffix → content type, checked in order, first match wins. Matching is
/// case-sensitive.
const CONTENT_TYPES: [(&str, MimeRule); 8] = [
    (".html", MimeRule::Fixed("text/html; charset=utf-8")),
    (".txt", MimeRule::Fixed("text/plain; charset=utf-8")),
    (".js", MimeRule::Fixed("text/javascript; charset=utf-8")),
    (".css", MimeRule::Fixed("text/css; charset=utf-8")),
    (".jpg", MimeRule::Image),
    (".jpeg", MimeRule::Image),
    (".png", MimeRule::Image),
    (".svg", MimeRule::Image),
];

/// Last `/`-separated segment of a key.
pub fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Infer a content type from the key's file name.
pub fn content_type_for(key: &str) -> Cow<'static, str> {
    let name = file_name(key);
    for (suffix, rule) in &CONTENT_TYPES {
        if name.ends_with(suffix) {
            return match rule {
                MimeRule::Fixed(mime) => Cow::Borrowed(*mime),
                MimeRule::Image => Cow::Owned(format!("image/{}", &suffix[1..])),
            };
        }
    }
    Cow::Borrowed(OCTET_STREAM)
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

fn http_date(object: &ObjectDescriptor) -> String {
    httpdate::fmt_http_date(SystemTime::from(object.uploaded))
}

/// Headers for a `GET` response.
///
/// `Content-Length` is the number of bytes served: the whole object, or the
/// range when one was served.
pub fn object_headers(object: &ObjectDescriptor, attachment: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();

    insert(&mut headers, header::CONTENT_TYPE, &content_type_for(&object.key));

    let length = object
        .range
        .map(|range| range.len(object.size))
        .unwrap_or(object.size);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    insert(&mut headers, header::ETAG, &object.http_etag);
    insert(&mut headers, header::LAST_MODIFIED, &http_date(object));

    if attachment {
        insert(
            &mut headers,
            header::CONTENT_DISPOSITION,
            &format!("attachment; filename={}", file_name(&object.key)),
        );
    }

    if let Some(range) = object.range {
        insert(
            &mut headers,
            header::CONTENT_RANGE,
            &format!(
                "bytes {}-{}/{}",
                range.offset,
                range.last_byte(object.size),
                object.size
            ),
        );
    }

    headers
}

/// Headers for a `HEAD` response: stored HTTP and custom metadata, then
/// length, etag and modification time.
pub fn metadata_headers(object: &ObjectDescriptor) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Some(http) = &object.http_metadata {
        http.write_headers(&mut headers);
    }
    if !headers.contains_key(header::CONTENT_TYPE) {
        insert(&mut headers, header::CONTENT_TYPE, &content_type_for(&object.key));
    }

    if let Some(custom) = &object.custom_metadata {
        for (key, value) in custom {
            let name = format!("{}{}", CUSTOM_METADATA_PREFIX, key);
            if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
                insert(&mut headers, name, value);
            }
        }
    }

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(object.size));
    insert(&mut headers, header::ETAG, &object.http_etag);
    insert(&mut headers, header::LAST_MODIFIED, &http_date(object));

    headers
}
