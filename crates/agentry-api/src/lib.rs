//! Application layer for Agentry: HTTP router, handlers, and state wiring.
//!
//! Exposed as a library so the `agentryd` binary and the integration tests
//! share the same surface.

pub mod http;
pub mod state;
