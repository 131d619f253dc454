//! # cadence-core
//!
//! Core types and error handling for the Cadence playback orchestrator.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
