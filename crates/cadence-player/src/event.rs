//! Events emitted by the player.
//!
//! Every session publishes into one broadcast channel owned by the
//! [`Player`](crate::Player). Payloads are plain data so hosts can forward
//! them as-is.

use cadence_core::Track;
use serde::Serialize;

use crate::transport::SessionKey;

/// An event tagged with the session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerEvent {
    pub key: SessionKey,
    pub kind: EventKind,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A new pipeline started after the first play.
    TrackChanged {
        /// Track now playing.
        track: Track,
        /// Track that was playing before.
        previous: Option<Track>,
        /// The transition was caused by an explicit skip.
        skipped: bool,
        /// Repeat mode at the time of the transition.
        repeat: bool,
    },
    /// The queue ran out.
    End,
    /// Playback was stopped.
    Stop,
    /// Nobody else is left in the destination.
    ChannelEmpty,
    /// A pipeline failed to open or errored while streaming.
    PipelineError {
        track: Option<Track>,
        message: String,
    },
}
