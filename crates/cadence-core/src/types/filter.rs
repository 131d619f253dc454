//! Audio filter toggles.
//!
//! The set of filters is closed: every session starts with every
//! [`FilterKind`] present and disabled, and commands can only flip them.
//! Rendering a filter into decoder arguments is left to the stream pipeline.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// A filter that can be applied to a stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    BassBoost,
    #[serde(rename = "8d")]
    EightD,
    Vaporwave,
    Nightcore,
    Phaser,
    Tremolo,
    Vibrato,
    Reverse,
    Treble,
    Normalizer,
    Surrounding,
    Pulsator,
    SubBoost,
    Karaoke,
    Flanger,
    Gate,
    Haas,
    Mcompand,
}

impl FilterKind {
    pub const ALL: [Self; 18] = [
        Self::BassBoost,
        Self::EightD,
        Self::Vaporwave,
        Self::Nightcore,
        Self::Phaser,
        Self::Tremolo,
        Self::Vibrato,
        Self::Reverse,
        Self::Treble,
        Self::Normalizer,
        Self::Surrounding,
        Self::Pulsator,
        Self::SubBoost,
        Self::Karaoke,
        Self::Flanger,
        Self::Gate,
        Self::Haas,
        Self::Mcompand,
    ];

    /// Canonical lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::BassBoost => "bassboost",
            Self::EightD => "8d",
            Self::Vaporwave => "vaporwave",
            Self::Nightcore => "nightcore",
            Self::Phaser => "phaser",
            Self::Tremolo => "tremolo",
            Self::Vibrato => "vibrato",
            Self::Reverse => "reverse",
            Self::Treble => "treble",
            Self::Normalizer => "normalizer",
            Self::Surrounding => "surrounding",
            Self::Pulsator => "pulsator",
            Self::SubBoost => "subboost",
            Self::Karaoke => "karaoke",
            Self::Flanger => "flanger",
            Self::Gate => "gate",
            Self::Haas => "haas",
            Self::Mcompand => "mcompand",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| Error::Config(format!("unknown filter: {s}")))
    }
}

/// Enabled/disabled state for every filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet(BTreeMap<FilterKind, bool>);

impl FilterSet {
    /// All filters present, all disabled.
    pub fn new() -> Self {
        Self(FilterKind::ALL.into_iter().map(|kind| (kind, false)).collect())
    }

    pub fn is_enabled(&self, kind: FilterKind) -> bool {
        self.0.get(&kind).copied().unwrap_or(false)
    }

    pub fn set(&mut self, kind: FilterKind, enabled: bool) {
        if let Some(slot) = self.0.get_mut(&kind) {
            *slot = enabled;
        }
    }

    /// Apply a batch of toggles. Filters not mentioned keep their state.
    pub fn merge<I>(&mut self, toggles: I)
    where
        I: IntoIterator<Item = (FilterKind, bool)>,
    {
        for (kind, enabled) in toggles {
            self.set(kind, enabled);
        }
    }

    /// Enabled filters in declaration order.
    pub fn enabled(&self) -> Vec<FilterKind> {
        self.0
            .iter()
            .filter_map(|(kind, enabled)| enabled.then_some(*kind))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FilterKind, bool)> + '_ {
        self.0.iter().map(|(kind, enabled)| (*kind, *enabled))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for FilterSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Tunable parameters used when rendering filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    /// Output sample rate in Hz; rate-shifting filters are relative to it.
    pub sample_rate: u32,
    /// Bass boost gain in dB.
    pub bass_gain_db: f32,
    /// Treble boost gain in dB.
    pub treble_gain_db: f32,
    /// Playback rate multiplier for nightcore.
    pub nightcore_rate: f32,
    /// Playback rate multiplier for vaporwave.
    pub vaporwave_rate: f32,
    /// Pan sweep frequency for 8D, in Hz.
    pub eight_d_hz: f32,
    /// Pulsator frequency in Hz.
    pub pulsator_hz: f32,
    /// Vibrato frequency in Hz.
    pub vibrato_hz: f32,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            bass_gain_db: 20.0,
            treble_gain_db: 5.0,
            nightcore_rate: 1.25,
            vaporwave_rate: 0.8,
            eight_d_hz: 0.08,
            pulsator_hz: 1.0,
            vibrato_hz: 6.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_set_starts_complete_and_disabled() {
        let filters = FilterSet::new();
        assert_eq!(filters.len(), FilterKind::ALL.len());
        assert!(filters.enabled().is_empty());
    }

    #[test]
    fn test_filter_merge_only_toggles() {
        let mut filters = FilterSet::new();
        filters.merge([(FilterKind::Nightcore, true), (FilterKind::BassBoost, true)]);
        filters.merge([(FilterKind::BassBoost, false)]);

        assert_eq!(filters.enabled(), vec![FilterKind::Nightcore]);
        assert_eq!(filters.len(), FilterKind::ALL.len());
    }

    #[test]
    fn test_filter_kind_parse() {
        assert_eq!("8D".parse::<FilterKind>().unwrap(), FilterKind::EightD);
        assert_eq!(" BassBoost ".parse::<FilterKind>().unwrap(), FilterKind::BassBoost);
        assert!("warp".parse::<FilterKind>().is_err());
    }

    #[test]
    fn test_filter_kind_serde_names() {
        let json = serde_json::to_string(&FilterKind::EightD).unwrap();
        assert_eq!(json, "\"8d\"");
        let kind: FilterKind = serde_json::from_str("\"subboost\"").unwrap();
        assert_eq!(kind, FilterKind::SubBoost);
    }
}
