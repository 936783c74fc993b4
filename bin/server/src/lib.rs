//! parley HTTP server.
//!
//! Exposes the conversation service over a small JSON API and supplies the
//! built-in tools.

pub mod config;
pub mod error;
pub mod routes;
pub mod tools;
