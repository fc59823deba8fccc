//! Core support types: error handling and configuration.
//!
//! Everything else in the crate builds on the [`QuireError`]/[`QuireResult`]
//! pair defined here; [`LabelFormat`] is the configuration surface of the
//! relabeling pass.

pub mod config;
pub mod errors;

pub use config::LabelFormat;
pub use errors::{QuireError, QuireResult};
