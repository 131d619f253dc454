//! Common value types shared across the workspace.

use serde::{Deserialize, Serialize};

/// Track length in whole seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct TrackDuration(pub u64);

impl TrackDuration {
    pub const fn from_seconds(seconds: u64) -> Self {
        Self(seconds)
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis / 1000)
    }

    pub const fn as_seconds(&self) -> u64 {
        self.0
    }

    pub const fn as_std(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.0)
    }

    /// Format as MM:SS or HH:MM:SS.
    pub fn format(&self) -> String {
        let total_secs = self.0;
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;

        if hours > 0 {
            format!("{hours}:{minutes:02}:{seconds:02}")
        } else {
            format!("{minutes}:{seconds:02}")
        }
    }
}

impl From<u64> for TrackDuration {
    fn from(seconds: u64) -> Self {
        Self(seconds)
    }
}

/// Session volume as a percentage.
///
/// The value is not clamped: callers may pass anything and it is forwarded to
/// the transport as `percent / 200`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Volume(u16);

impl Volume {
    pub const DEFAULT: Self = Self(100);

    pub const fn from_percent(percent: u16) -> Self {
        Self(percent)
    }

    pub const fn percent(&self) -> u16 {
        self.0
    }

    /// Linear gain handed to the transport. 100% maps to 0.5.
    pub fn gain(&self) -> f32 {
        f32::from(self.0) / 200.0
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::DEFAULT
    }
}
