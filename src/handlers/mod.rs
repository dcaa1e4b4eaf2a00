//! HTTP handlers. `root_handlers` serves the bucket root, `object_handlers`
//! every non-empty key, and `headers` builds response headers from
//! descriptors.

pub mod headers;
pub mod object_handlers;
pub mod root_handlers;

/// First value given for `name` in a decoded query string.
///
/// Repeated parameters are tolerated; later values are ignored.
pub(crate) fn first_param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}
