//! HTTP request handlers.

pub mod agents;
pub mod events;
pub mod runs;
pub mod trigger;

use axum::http::HeaderMap;

/// Read a header as a UTF-8 string, treating absence and bad encoding alike.
pub(crate) fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}
