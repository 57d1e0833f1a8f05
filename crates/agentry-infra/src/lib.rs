//! Infrastructure implementations for Agentry.
//!
//! Provides the HMAC-SHA256 signature verifier, SQLite persistence for runs
//! and the audit log, the reqwest-based executor client, and the TOML
//! catalog/config loaders. Everything here implements a trait defined in
//! agentry-core.

pub mod catalog;
pub mod config;
pub mod executor;
pub mod signature;
pub mod sqlite;
