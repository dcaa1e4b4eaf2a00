//! Defines the gateway's routes.
//!
//! ## Structure
//! - `ANY /`        — welcome page, or JSON listing when `?prefix=` is given
//! - `ANY /{*key}`  — object operations, dispatched on the method:
//!   `OPTIONS`, `HEAD`, `GET`, `PUT`/`POST`, `DELETE`; anything else is 400
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`.
//! Every response, errors included, carries permissive CORS headers.

use crate::{
    handlers::{object_handlers::handle_object, root_handlers::handle_root},
    state::AppState,
};
use axum::{
    Router,
    http::{HeaderValue, header},
    routing::any,
};
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

/// Build the router for all gateway routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", any(handle_root))
        .route("/{*key}", any(handle_object))
}

/// The complete application: routes, state, CORS and request tracing.
pub fn app(state: AppState) -> Router {
    let allow_all = HeaderValue::from_static("*");
    routes()
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            allow_all.clone(),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            allow_all.clone(),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            allow_all,
        ))
        .layer(TraceLayer::new_for_http())
}
