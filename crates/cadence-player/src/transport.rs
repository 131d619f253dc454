//! Voice transport boundary.
//!
//! A transport joins a [`Destination`] and hands back a [`Connection`] that
//! can play one stream at a time. Every call to [`Connection::play`] yields a
//! fresh [`PipelineHandle`] whose signals arrive as `Start` followed by either
//! `Finish` or `Error`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cadence_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::pipeline::AudioStream;

/// Identifies a session. There is one session per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey(pub String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies a voice destination (e.g. a voice channel).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DestinationId(pub String);

impl DestinationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An audio sink a session is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Session this destination belongs to.
    pub key: SessionKey,
    /// Sink identifier.
    pub id: DestinationId,
    /// Human-readable name, used in logs only.
    pub name: String,
}

impl Destination {
    pub fn new(key: SessionKey, id: DestinationId, name: impl Into<String>) -> Self {
        Self {
            key,
            id,
            name: name.into(),
        }
    }

    /// Reject destinations with blank identifiers.
    pub fn validate(&self) -> Result<()> {
        if self.key.as_str().trim().is_empty() {
            return Err(Error::InvalidDestination("session key is empty".to_string()));
        }
        if self.id.as_str().trim().is_empty() {
            return Err(Error::InvalidDestination(format!(
                "destination id is empty for session {}",
                self.key
            )));
        }
        Ok(())
    }
}

/// Lifecycle signal of a single pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineSignal {
    /// Audio started flowing.
    Start,
    /// The stream ended, either naturally or because it was told to.
    Finish,
    /// The stream failed.
    Error(String),
}

/// Receiving side of a pipeline's signals.
#[derive(Debug)]
pub struct PipelineHandle {
    signals: mpsc::UnboundedReceiver<PipelineSignal>,
}

impl PipelineHandle {
    pub const fn new(signals: mpsc::UnboundedReceiver<PipelineSignal>) -> Self {
        Self { signals }
    }

    /// Create a handle along with the sender the transport reports through.
    pub fn channel() -> (mpsc::UnboundedSender<PipelineSignal>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::new(rx))
    }

    /// Wait for the next signal. A transport that drops its sender without
    /// finishing is reported as an error.
    pub async fn next(&mut self) -> PipelineSignal {
        self.signals.recv().await.unwrap_or_else(|| {
            PipelineSignal::Error("pipeline closed without finishing".to_string())
        })
    }
}

/// A live connection to a destination.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Resolves once the connection can accept audio.
    async fn ready(&self) -> Result<()>;

    /// Start streaming. Replaces nothing: callers end the previous pipeline first.
    async fn play(&self, stream: AudioStream) -> Result<PipelineHandle>;

    fn pause(&self);

    fn resume(&self);

    /// Force the active pipeline to finish.
    fn end(&self);

    /// Linear output gain, 0.5 at 100% volume.
    fn set_gain(&self, gain: f32);

    /// Time the active pipeline has been streaming, excluding pauses.
    fn elapsed(&self) -> Duration;

    /// Disconnect from the destination.
    async fn leave(&self);
}

/// Joins destinations.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Join a destination, reusing an existing connection to it if present.
    async fn join(&self, destination: &Destination) -> Result<Arc<dyn Connection>>;
}
