//! Row structs and insert DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity matching the
//! database row and, where rows are created from application input, a
//! create DTO.

pub mod image;
pub mod task;
pub mod user;
