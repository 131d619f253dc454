//! Per-destination playback state.
//!
//! [`Session`] holds no I/O handles. It only answers questions such as "what
//! plays next" and applies queue edits; the session worker drives the
//! transport around it.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::collections::VecDeque;
use std::time::Duration;

use cadence_core::{FilterKind, FilterSet, Track, Volume};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::transport::{Destination, SessionKey};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Starting,
    Playing,
    Paused,
    Stopped,
}

/// Selects a pending track for removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSelector {
    /// Position in the pending sequence, 0 being the next track up.
    Index(usize),
    /// First pending track with this id.
    Id(String),
}

impl From<usize> for TrackSelector {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&Track> for TrackSelector {
    fn from(track: &Track) -> Self {
        Self::Id(track.id.clone())
    }
}

/// Why a session is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// The queue ran out.
    Ended,
    /// `stop` was requested.
    Stopped,
}

/// Outcome of a finished pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Play the current track again from the start.
    Replay,
    /// A new current track was taken from the queue.
    Next {
        previous: Option<Track>,
        first_play: bool,
    },
    /// Nothing left to play.
    Teardown(Teardown),
}

/// Read-only copy of a session's queue and flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub key: SessionKey,
    pub current: Option<Track>,
    pub pending: Vec<Track>,
    pub state: PlaybackState,
    pub volume: Volume,
    pub repeat: bool,
    pub filters: FilterSet,
}

impl QueueSnapshot {
    /// The current track followed by everything pending.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.current.iter().chain(self.pending.iter())
    }

    pub fn len(&self) -> usize {
        usize::from(self.current.is_some()) + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn is_paused(&self) -> bool {
        matches!(self.state, PlaybackState::Paused)
    }
}

/// Mutable state of one session.
#[derive(Debug, Clone)]
pub struct Session {
    key: SessionKey,
    destination: Destination,
    pending: VecDeque<Track>,
    current: Option<Track>,
    filters: FilterSet,
    volume: Volume,
    state: PlaybackState,
    paused: bool,
    stopped: bool,
    repeat: bool,
    last_skipped: bool,
    first_play: bool,
    stream_offset: Duration,
}

impl Session {
    pub fn new(destination: Destination, volume: Volume) -> Self {
        Self {
            key: destination.key.clone(),
            destination,
            pending: VecDeque::new(),
            current: None,
            filters: FilterSet::new(),
            volume,
            state: PlaybackState::Idle,
            paused: false,
            stopped: false,
            repeat: false,
            last_skipped: false,
            first_play: true,
            stream_offset: Duration::ZERO,
        }
    }

    pub const fn key(&self) -> &SessionKey {
        &self.key
    }

    pub const fn destination(&self) -> &Destination {
        &self.destination
    }

    pub const fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub const fn pending(&self) -> &VecDeque<Track> {
        &self.pending
    }

    pub const fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub const fn volume(&self) -> Volume {
        self.volume
    }

    pub const fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn set_state(&mut self, state: PlaybackState) {
        self.state = state;
    }

    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub const fn repeat(&self) -> bool {
        self.repeat
    }

    pub const fn last_skipped(&self) -> bool {
        self.last_skipped
    }

    pub const fn is_first_play(&self) -> bool {
        self.first_play
    }

    pub const fn stream_offset(&self) -> Duration {
        self.stream_offset
    }

    /// Record that a pipeline started at `offset` into the current track.
    pub fn mark_started(&mut self, offset: Duration) {
        self.stream_offset = offset;
        self.state = if self.paused {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        };
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
        if self.current.is_some() {
            self.state = if paused {
                PlaybackState::Paused
            } else {
                PlaybackState::Playing
            };
        }
    }

    pub fn set_volume(&mut self, volume: Volume) {
        self.volume = volume;
    }

    pub fn set_repeat(&mut self, repeat: bool) {
        self.repeat = repeat;
    }

    pub fn mark_skipped(&mut self) {
        self.last_skipped = true;
    }

    /// Flag the session for teardown and drop everything pending.
    pub fn mark_stopped(&mut self) {
        self.stopped = true;
        self.pending.clear();
    }

    pub fn merge_filters(&mut self, toggles: impl IntoIterator<Item = (FilterKind, bool)>) {
        self.filters.merge(toggles);
    }

    /// Append a track to the pending sequence.
    pub fn push(&mut self, track: Track) {
        self.pending.push_back(track);
    }

    /// Replace the pending sequence wholesale.
    pub fn set_queue(&mut self, tracks: Vec<Track>) {
        self.pending = tracks.into();
    }

    /// Keep only the current track.
    pub fn clear_queue(&mut self) {
        self.pending.clear();
    }

    /// Uniformly permute the pending sequence. The current track is not part
    /// of it and so never moves.
    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.pending.make_contiguous().shuffle(rng);
    }

    pub fn shuffle(&mut self) {
        self.shuffle_with(&mut rand::thread_rng());
    }

    /// Remove a pending track. Returns `None` without touching the queue when
    /// nothing matches.
    pub fn remove(&mut self, selector: &TrackSelector) -> Option<Track> {
        let index = match selector {
            TrackSelector::Index(index) => *index,
            TrackSelector::Id(id) => self.pending.iter().position(|t| &t.id == id)?,
        };
        self.pending.remove(index)
    }

    /// Decide what a finished pipeline leads to, consuming the next track if
    /// there is one.
    ///
    /// `allow_repeat` is false after a pipeline error so a broken track is not
    /// retried forever.
    pub fn advance(&mut self, allow_repeat: bool) -> Advance {
        if self.stopped {
            return Advance::Teardown(Teardown::Stopped);
        }

        if allow_repeat && self.repeat && self.current.is_some() {
            return Advance::Replay;
        }

        if !self.pending.is_empty() || self.first_play {
            if let Some(next) = self.pending.pop_front() {
                let previous = self.current.replace(next);
                let first_play = std::mem::replace(&mut self.first_play, false);
                self.state = PlaybackState::Starting;
                return Advance::Next {
                    previous,
                    first_play,
                };
            }
        }

        Advance::Teardown(Teardown::Ended)
    }

    /// Clear `last_skipped`, returning what it was.
    pub fn take_skipped(&mut self) -> bool {
        std::mem::take(&mut self.last_skipped)
    }

    /// Linear gain for the current volume.
    pub fn gain(&self) -> f32 {
        self.volume.gain()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            key: self.key.clone(),
            current: self.current.clone(),
            pending: self.pending.iter().cloned().collect(),
            state: self.state,
            volume: self.volume,
            repeat: self.repeat,
            filters: self.filters.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::DestinationId;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn make_track(id: &str) -> Track {
        Track::new(id, format!("https://example.com/{id}"), format!("Track {id}"))
    }

    fn make_session(ids: &[&str]) -> Session {
        let destination = Destination::new(
            SessionKey::new("guild"),
            DestinationId::new("voice"),
            "General",
        );
        let mut session = Session::new(destination, Volume::DEFAULT);
        for id in ids {
            session.push(make_track(id));
        }
        session
    }

    fn pending_ids(session: &Session) -> Vec<String> {
        session.pending().iter().map(|t| t.id.clone()).collect()
    }

    #[test]
    fn test_first_play_takes_head_without_previous() {
        let mut session = make_session(&["a"]);
        assert_eq!(
            session.advance(true),
            Advance::Next {
                previous: None,
                first_play: true
            }
        );
        assert_eq!(session.current().unwrap().id, "a");
        assert!(!session.is_first_play());
    }

    #[test]
    fn test_queue_runs_out() {
        let mut session = make_session(&["a", "b", "c"]);
        session.advance(true);

        assert!(matches!(session.advance(true), Advance::Next { first_play: false, .. }));
        assert_eq!(session.current().unwrap().id, "b");
        assert_eq!(pending_ids(&session), vec!["c"]);

        session.advance(true);
        assert_eq!(session.current().unwrap().id, "c");
        assert!(session.pending().is_empty());

        assert_eq!(session.advance(true), Advance::Teardown(Teardown::Ended));
    }

    #[test]
    fn test_single_track_without_repeat_ends() {
        let mut session = make_session(&["a"]);
        session.advance(true);
        assert_eq!(session.advance(true), Advance::Teardown(Teardown::Ended));
    }

    #[test]
    fn test_repeat_replays_current() {
        let mut session = make_session(&["a", "b"]);
        session.advance(true);
        session.set_repeat(true);

        for _ in 0..3 {
            assert_eq!(session.advance(true), Advance::Replay);
            assert_eq!(session.current().unwrap().id, "a");
        }
        assert_eq!(pending_ids(&session), vec!["b"]);
    }

    #[test]
    fn test_repeat_suppressed_after_error() {
        let mut session = make_session(&["a"]);
        session.advance(true);
        session.set_repeat(true);
        assert_eq!(session.advance(false), Advance::Teardown(Teardown::Ended));
    }

    #[test]
    fn test_stop_wins_over_repeat() {
        let mut session = make_session(&["a", "b"]);
        session.advance(true);
        session.set_repeat(true);
        session.mark_stopped();

        assert!(session.pending().is_empty());
        assert_eq!(session.advance(true), Advance::Teardown(Teardown::Stopped));
    }

    #[test]
    fn test_skip_flag_is_taken_once() {
        let mut session = make_session(&["a"]);
        session.mark_skipped();
        assert!(session.take_skipped());
        assert!(!session.take_skipped());
    }

    #[test]
    fn test_clear_queue_keeps_current() {
        let mut session = make_session(&["a", "b", "c"]);
        session.advance(true);
        session.clear_queue();

        let snapshot = session.snapshot();
        let ids: Vec<_> = snapshot.tracks().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn test_remove_by_index_and_id() {
        let mut session = make_session(&["a", "b", "c"]);
        assert_eq!(session.remove(&TrackSelector::Index(1)).unwrap().id, "b");
        assert_eq!(
            session.remove(&TrackSelector::Id("c".to_string())).unwrap().id,
            "c"
        );
        assert_eq!(pending_ids(&session), vec!["a"]);
    }

    #[test]
    fn test_remove_without_match_is_noop() {
        let mut session = make_session(&["a", "b"]);
        assert!(session.remove(&TrackSelector::Index(7)).is_none());
        assert!(session.remove(&TrackSelector::Id("zzz".to_string())).is_none());
        assert_eq!(pending_ids(&session), vec!["a", "b"]);
    }

    #[test]
    fn test_set_queue_replaces_pending() {
        let mut session = make_session(&["a", "b"]);
        session.advance(true);
        session.set_queue(vec![make_track("x"), make_track("y")]);
        assert_eq!(session.current().unwrap().id, "a");
        assert_eq!(pending_ids(&session), vec!["x", "y"]);
    }

    #[test]
    fn test_shuffle_is_uniform_over_three() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts = std::collections::HashMap::new();
        let rounds = 6000;

        for _ in 0..rounds {
            let mut session = make_session(&["head", "a", "b", "c"]);
            session.advance(true);
            session.shuffle_with(&mut rng);
            *counts.entry(pending_ids(&session).concat()).or_insert(0) += 1;
        }

        // 3! orderings, each expected 1000 times.
        assert_eq!(counts.len(), 6);
        for count in counts.values() {
            assert!((850..1150).contains(count), "skewed shuffle: {counts:?}");
        }
    }

    proptest! {
        #[test]
        fn prop_shuffle_keeps_current_and_permutes(len in 0usize..20, seed in any::<u64>()) {
            let ids: Vec<String> = (0..=len).map(|i| i.to_string()).collect();
            let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
            let mut session = make_session(&refs);
            session.advance(true);

            let mut before = pending_ids(&session);
            session.shuffle_with(&mut StdRng::seed_from_u64(seed));
            let mut after = pending_ids(&session);

            prop_assert_eq!(session.current().unwrap().id.as_str(), "0");
            before.sort();
            after.sort();
            prop_assert_eq!(before, after);
        }

        #[test]
        fn prop_out_of_range_remove_is_noop(len in 0usize..10, extra in 0usize..10) {
            let ids: Vec<String> = (0..len).map(|i| i.to_string()).collect();
            let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
            let mut session = make_session(&refs);

            let removed = session.remove(&TrackSelector::Index(len + extra));
            prop_assert!(removed.is_none());
            prop_assert_eq!(pending_ids(&session), ids);
        }
    }
}
