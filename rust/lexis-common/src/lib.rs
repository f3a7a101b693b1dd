//! Core definitions relied upon by all lexis-* crates: the shared error type,
//! the `Result` alias and the verification macros.

pub mod error;
pub mod macros;
pub mod result;

pub use result::Result;
