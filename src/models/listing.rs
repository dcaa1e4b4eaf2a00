//! List request options and the page returned for them.

use super::object::ObjectDescriptor;
use serde::Serialize;

/// Metadata groups a listing may carry for each object.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Include {
    HttpMetadata,
    CustomMetadata,
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct ListOptions {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    /// Opaque cursor from a previous page.
    pub cursor: Option<String>,
    /// Maximum objects per page; the backend applies its own default.
    pub limit: Option<usize>,
    pub include: Vec<Include>,
}

impl ListOptions {
    pub fn includes(&self, what: Include) -> bool {
        self.include.contains(&what)
    }
}

/// One page of a bucket listing, serialized as-is to clients.
#[derive(Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub objects: Vec<ObjectDescriptor>,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    pub delimited_prefixes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn serializes_in_camel_case() {
        let uploaded = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let listing = Listing {
            objects: vec![ObjectDescriptor::new("docs/a.txt", 5, "abc", uploaded)],
            truncated: true,
            cursor: Some("ZG9jcy9hLnR4dA==".into()),
            delimited_prefixes: vec!["docs/sub/".into()],
        };

        let json = serde_json::to_value(&listing).unwrap();
        assert_eq!(json["truncated"], true);
        assert_eq!(json["delimitedPrefixes"][0], "docs/sub/");
        assert_eq!(json["objects"][0]["httpEtag"], "\"abc\"");
        assert!(json["objects"][0].get("range").is_none());
        assert!(json["objects"][0].get("httpMetadata").is_none());
    }
}
