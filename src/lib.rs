//! HTTP gateway over a single object bucket, with a background sweeper that
//! expires short-lived objects.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
