//! Stream pipeline and track provider boundaries.

use std::time::Duration;

use async_trait::async_trait;
use cadence_core::{FilterKind, Requester, Result, Track};
use tokio::io::AsyncRead;

/// Decoded audio handed to a [`Connection`](crate::Connection).
pub type AudioStream = Box<dyn AsyncRead + Send + Unpin>;

/// How a pipeline should open a track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamOptions {
    /// Offset into the track to start from.
    pub seek: Duration,
    /// Enabled filters, in declaration order.
    pub filters: Vec<FilterKind>,
}

/// Produces an audio stream for a track.
#[async_trait]
pub trait StreamPipeline: Send + Sync {
    async fn open(&self, track: &Track, options: &StreamOptions) -> Result<AudioStream>;
}

/// Resolves text queries into tracks.
#[async_trait]
pub trait TrackProvider: Send + Sync {
    /// Ordered candidates. No results is an empty list, not an error.
    async fn search(&self, query: &str) -> Result<Vec<Track>>;
}

/// Turns a track's source reference into something a decoder can read.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, track: &Track) -> Result<String>;
}

/// What to start playing.
#[derive(Debug, Clone)]
pub enum TrackRequest {
    /// An already-resolved track.
    Track(Track),
    /// A query resolved to its first search result.
    Query(String),
}

impl TrackRequest {
    /// Resolve to a track attributed to `requester`.
    pub async fn resolve(
        self,
        provider: &dyn TrackProvider,
        requester: Option<Requester>,
    ) -> Result<Track> {
        let track = match self {
            Self::Track(track) => track,
            Self::Query(query) => first_result(provider, &query).await?,
        };
        Ok(track.requested_by_user(requester))
    }
}

impl From<Track> for TrackRequest {
    fn from(track: Track) -> Self {
        Self::Track(track)
    }
}

impl From<&str> for TrackRequest {
    fn from(query: &str) -> Self {
        Self::Query(query.to_string())
    }
}

impl From<String> for TrackRequest {
    fn from(query: String) -> Self {
        Self::Query(query)
    }
}

/// First search hit for `query`, or `TrackNotFound`.
pub async fn first_result(provider: &dyn TrackProvider, query: &str) -> Result<Track> {
    provider
        .search(query)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| cadence_core::Error::TrackNotFound(query.to_string()))
}
