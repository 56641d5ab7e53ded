//! veridock-common — Shared errors and the sandboxed HTTP client used across
//! all Veridock crates.

pub mod error;
pub mod sandbox;

pub use error::{Result, VeridockError};
