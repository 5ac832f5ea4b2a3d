//! imagepp HTTP server library.
//!
//! Exposes configuration, state, error handling, the submission service and
//! the routes so integration tests and the binary entrypoint share them.

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod routes;
pub mod state;
pub mod submission;
