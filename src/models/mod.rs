//! Core data models for the bucket gateway.
//!
//! Descriptors are built per request from backend responses and serialize
//! naturally as JSON via `serde` for listings.

pub mod listing;
pub mod object;
