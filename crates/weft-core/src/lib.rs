//! # weft-core
//!
//! Shared error taxonomy for the weft template engine. The engine crate
//! (`weft`) re-exports everything here, so most users never depend on this
//! crate directly.

pub mod error;

pub use error::{SourceLocation, WeftError};
