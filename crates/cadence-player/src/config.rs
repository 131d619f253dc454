//! Player configuration.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::Path;

use cadence_core::{Error, FilterParams, Result, Volume};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Options shared by every session of a [`Player`](crate::Player).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerOptions {
    /// Leave the destination when the queue runs out.
    pub leave_on_end: bool,
    /// Leave the destination when playback is stopped.
    pub leave_on_stop: bool,
    /// Leave the destination once nobody else is listening.
    pub leave_on_empty: bool,
    /// Volume new sessions start with.
    pub initial_volume: Volume,
    /// Parameters for rendering filters.
    pub filter_params: FilterParams,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            leave_on_end: true,
            leave_on_stop: true,
            leave_on_empty: true,
            initial_volume: Volume::DEFAULT,
            filter_params: FilterParams::default(),
            event_capacity: 256,
        }
    }
}

impl PlayerOptions {
    /// Parse options from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading player options from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be non-zero".to_string()));
        }
        if self.filter_params.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_leave_everywhere() {
        let options = PlayerOptions::default();
        assert!(options.leave_on_end);
        assert!(options.leave_on_stop);
        assert!(options.leave_on_empty);
        assert_eq!(options.initial_volume.percent(), 100);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options =
            PlayerOptions::from_json_str(r#"{ "leave_on_end": false, "initial_volume": 40 }"#)
                .unwrap();
        assert!(!options.leave_on_end);
        assert!(options.leave_on_stop);
        assert_eq!(options.initial_volume.percent(), 40);
        assert_eq!(options.filter_params.sample_rate, 48_000);
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = PlayerOptions::from_json_str(r#"{ "event_capacity": 0 }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
