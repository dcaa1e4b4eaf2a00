//! Handler for the bucket root (`/`): a welcome page, or a JSON listing when
//! a `prefix` is given.

use crate::{
    errors::AppError,
    handlers::first_param,
    models::listing::{Include, ListOptions},
    state::AppState,
};
use axum::{
    extract::{Query, State},
    http::{HeaderValue, header},
    response::{Html, IntoResponse, Response},
};
use tracing::info;

const WELCOME_PAGE: &str = r#"<!doctype html>
<html>
  <head><meta charset="utf-8"><title>bucket-gateway</title></head>
  <body>
    <div style="text-align:center; margin-top: 100px;">
      <p>bucket-gateway is running.</p>
      <p>List objects with <code>GET /?prefix=...</code>; read and write them at <code>/{key}</code>.</p>
    </div>
  </body>
</html>
"#;

#[derive(Debug, Default)]
pub struct ListQuery {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub cursor: Option<String>,
}

impl ListQuery {
    pub fn from_params(params: &[(String, String)]) -> Self {
        let get = |name: &str| first_param(params, name).map(str::to_string);
        Self {
            prefix: get("prefix"),
            delimiter: get("delimiter"),
            cursor: get("cursor"),
        }
    }
}

/// Any method on `/`.
///
/// Without a non-empty `prefix` the static welcome page is returned, so the
/// whole bucket is never enumerated by accident.
pub async fn handle_root(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let q = ListQuery::from_params(&params);
    let Some(prefix) = q.prefix.filter(|p| !p.is_empty()) else {
        return Ok(Html(WELCOME_PAGE).into_response());
    };

    let options = ListOptions {
        prefix: Some(prefix),
        delimiter: q.delimiter,
        cursor: q.cursor,
        limit: None,
        include: vec![Include::CustomMetadata, Include::HttpMetadata],
    };
    info!(
        prefix = ?options.prefix,
        delimiter = ?options.delimiter,
        cursor = ?options.cursor,
        "listing objects"
    );

    let listing = state.bucket.list(options).await?;
    let body = serde_json::to_vec(&listing)
        .map_err(|err| AppError::internal(format!("serializing listing: {}", err)))?;

    let mut response = body.into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=UTF-8"),
    );
    Ok(response)
}
