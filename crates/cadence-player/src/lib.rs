//! # cadence-player
//!
//! Per-destination playback sessions for Cadence.
//!
//! Features:
//! - One session per key, each driven by its own worker task
//! - Transport controls, queue edits, repeat and shuffle
//! - Filter changes restart the stream at the current position
//! - Sessions tear themselves down when the queue ends, on stop, or when
//!   their destination empties

pub mod config;
pub mod event;
pub mod pipeline;
pub mod player;
pub mod registry;
pub mod session;
pub mod transport;
pub mod watcher;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use config::PlayerOptions;
pub use event::{EventKind, PlayerEvent};
pub use pipeline::{
    AudioStream, SourceResolver, StreamOptions, StreamPipeline, TrackProvider, TrackRequest,
};
pub use player::Player;
pub use registry::SessionRegistry;
pub use session::{PlaybackState, QueueSnapshot, Session, TrackSelector};
pub use transport::{
    Connection, Destination, DestinationId, PipelineHandle, PipelineSignal, SessionKey,
    VoiceTransport,
};
pub use watcher::{MembershipChange, MembershipEvent, MembershipWatcher};
pub use worker::SessionHandle;
