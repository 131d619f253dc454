//! Core domain types for Cadence.

pub mod common;
pub mod filter;
pub mod track;

pub use common::{TrackDuration, Volume};
pub use filter::{FilterKind, FilterParams, FilterSet};
pub use track::{Requester, Track};
