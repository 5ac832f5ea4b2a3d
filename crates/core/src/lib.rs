//! Domain types shared by the submission API and the worker.
//!
//! Nothing in this crate performs I/O. The Job Store, Object Store and
//! Task Queue crates build on these types.

pub mod envelope;
pub mod error;
pub mod operation;
pub mod request;
pub mod status;
pub mod types;
