//! Track type representing a single playable item.

use serde::{Deserialize, Serialize};

use super::TrackDuration;

/// A single streamable track.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Track {
    /// Provider-specific identifier.
    pub id: String,
    /// Source reference handed to the stream pipeline.
    pub url: String,
    /// Track title.
    pub title: String,
    /// Uploader or artist name.
    pub author: String,
    /// Track duration.
    pub duration: TrackDuration,
    /// Thumbnail URL (if available).
    pub thumbnail: Option<String>,
    /// View count reported by the provider.
    pub views: u64,
    /// Who queued this track.
    pub requested_by: Option<Requester>,
}

impl Track {
    pub fn new(id: impl Into<String>, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: title.into(),
            author: String::new(),
            duration: TrackDuration::default(),
            thumbnail: None,
            views: 0,
            requested_by: None,
        }
    }

    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    #[must_use]
    pub const fn with_duration(mut self, duration: TrackDuration) -> Self {
        self.duration = duration;
        self
    }

    /// Attribute this track to the user who queued it.
    #[must_use]
    pub fn requested_by_user(mut self, requester: Option<Requester>) -> Self {
        self.set_requester(requester);
        self
    }

    pub fn set_requester(&mut self, requester: Option<Requester>) {
        self.requested_by = requester;
    }

    /// "Title by Author", or just the title when the author is unknown.
    pub fn display_name(&self) -> String {
        if self.author.is_empty() {
            self.title.clone()
        } else {
            format!("{} by {}", self.title, self.author)
        }
    }
}

/// Identity of whoever asked for a track.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Requester {
    pub id: String,
    pub name: String,
}

impl Requester {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
