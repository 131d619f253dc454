//! Scripted collaborators for exercising the player without real audio.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cadence_core::{Error, Result, Track};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use crate::config::PlayerOptions;
use crate::event::{EventKind, PlayerEvent};
use crate::pipeline::{AudioStream, StreamOptions, StreamPipeline, TrackProvider};
use crate::player::Player;
use crate::transport::{
    Connection, Destination, DestinationId, PipelineHandle, PipelineSignal, SessionKey,
    VoiceTransport,
};

pub fn track(id: &str) -> Track {
    Track::new(id, format!("https://example.com/{id}"), format!("Track {id}")).with_author("Tester")
}

/// Provider answering from a fixed table.
#[derive(Default)]
pub struct MockProvider {
    results: Mutex<HashMap<String, Vec<Track>>>,
    searches: AtomicUsize,
}

impl MockProvider {
    pub fn add(&self, query: &str, tracks: Vec<Track>) {
        self.results.lock().insert(query.to_string(), tracks);
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrackProvider for MockProvider {
    async fn search(&self, query: &str) -> Result<Vec<Track>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.lock().get(query).cloned().unwrap_or_default())
    }
}

/// Pipeline that records what it was asked to open.
#[derive(Default)]
pub struct MockPipeline {
    opened: Mutex<Vec<(String, StreamOptions)>>,
    broken: Mutex<HashSet<String>>,
}

impl MockPipeline {
    pub fn last_opened(&self) -> (String, StreamOptions) {
        self.opened.lock().last().cloned().expect("nothing opened")
    }

    /// Make every future open of `id` fail.
    pub fn break_track(&self, id: &str) {
        self.broken.lock().insert(id.to_string());
    }
}

#[async_trait]
impl StreamPipeline for MockPipeline {
    async fn open(&self, track: &Track, options: &StreamOptions) -> Result<AudioStream> {
        if self.broken.lock().contains(&track.id) {
            return Err(Error::Pipeline(format!("cannot decode {}", track.id)));
        }
        self.opened.lock().push((track.id.clone(), options.clone()));
        Ok(Box::new(tokio::io::empty()))
    }
}

#[derive(Default)]
struct ConnectionState {
    active: Option<mpsc::UnboundedSender<PipelineSignal>>,
    plays: usize,
    overlaps: usize,
    gain: f32,
    paused: bool,
    elapsed: Duration,
    left: bool,
    fail_next_start: Option<String>,
}

/// Connection whose pipelines start immediately and finish on command.
#[derive(Default)]
pub struct MockConnection {
    state: Mutex<ConnectionState>,
}

impl MockConnection {
    /// Finish the active pipeline as if the track ran out.
    pub fn finish(&self) {
        let tx = self.state.lock().active.take().expect("no active pipeline");
        let _ = tx.send(PipelineSignal::Finish);
    }

    /// Fail the active pipeline mid-stream.
    pub fn fail(&self, message: &str) {
        let tx = self.state.lock().active.take().expect("no active pipeline");
        let _ = tx.send(PipelineSignal::Error(message.to_string()));
    }

    pub fn fail_next_start(&self, message: &str) {
        self.state.lock().fail_next_start = Some(message.to_string());
    }

    pub fn set_elapsed(&self, elapsed: Duration) {
        self.state.lock().elapsed = elapsed;
    }

    pub fn gain(&self) -> f32 {
        self.state.lock().gain
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn has_left(&self) -> bool {
        self.state.lock().left
    }

    pub fn plays(&self) -> usize {
        self.state.lock().plays
    }

    /// Times `play` was called while another pipeline was still live.
    pub fn overlaps(&self) -> usize {
        self.state.lock().overlaps
    }

    pub fn is_streaming(&self) -> bool {
        self.state.lock().active.is_some()
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn ready(&self) -> Result<()> {
        Ok(())
    }

    async fn play(&self, _stream: AudioStream) -> Result<PipelineHandle> {
        let mut state = self.state.lock();
        if state.active.is_some() {
            state.overlaps += 1;
        }
        state.plays += 1;
        state.paused = false;
        state.elapsed = Duration::ZERO;
        state.left = false;

        let (tx, handle) = PipelineHandle::channel();
        if let Some(message) = state.fail_next_start.take() {
            let _ = tx.send(PipelineSignal::Error(message));
        } else {
            let _ = tx.send(PipelineSignal::Start);
            state.active = Some(tx);
        }
        Ok(handle)
    }

    fn pause(&self) {
        self.state.lock().paused = true;
    }

    fn resume(&self) {
        self.state.lock().paused = false;
    }

    fn end(&self) {
        if let Some(tx) = self.state.lock().active.take() {
            let _ = tx.send(PipelineSignal::Finish);
        }
    }

    fn set_gain(&self, gain: f32) {
        self.state.lock().gain = gain;
    }

    fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }

    async fn leave(&self) {
        let mut state = self.state.lock();
        state.left = true;
        state.active = None;
    }
}

/// Transport handing out one [`MockConnection`] per destination.
#[derive(Default)]
pub struct MockTransport {
    connections: Mutex<HashMap<DestinationId, Arc<MockConnection>>>,
    joins: AtomicUsize,
}

impl MockTransport {
    pub fn connection(&self, id: &DestinationId) -> Arc<MockConnection> {
        Arc::clone(self.connections.lock().entry(id.clone()).or_default())
    }

    pub fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceTransport for MockTransport {
    async fn join(&self, destination: &Destination) -> Result<Arc<dyn Connection>> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        let connection: Arc<dyn Connection> = self.connection(&destination.id);
        Ok(connection)
    }
}

/// A player wired to mocks, plus an event subscription.
pub struct Harness {
    pub player: Player,
    pub provider: Arc<MockProvider>,
    pub transport: Arc<MockTransport>,
    pub pipeline: Arc<MockPipeline>,
    pub events: broadcast::Receiver<PlayerEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(PlayerOptions::default())
    }

    pub fn with_options(options: PlayerOptions) -> Self {
        let provider = Arc::new(MockProvider::default());
        let transport = Arc::new(MockTransport::default());
        let pipeline = Arc::new(MockPipeline::default());
        let player = Player::new(
            provider.clone(),
            transport.clone(),
            pipeline.clone(),
            options,
        );
        let events = player.subscribe();
        Self {
            player,
            provider,
            transport,
            pipeline,
            events,
        }
    }

    pub fn key(name: &str) -> SessionKey {
        SessionKey::new(name)
    }

    pub fn destination(name: &str) -> Destination {
        Destination::new(
            SessionKey::new(name),
            DestinationId::new(format!("{name}-voice")),
            format!("{name} voice"),
        )
    }

    pub fn connection(&self, name: &str) -> Arc<MockConnection> {
        self.transport
            .connection(&DestinationId::new(format!("{name}-voice")))
    }

    /// Play `first` on `name`, then queue the rest.
    pub async fn start(&self, name: &str, first: &str, rest: &[&str]) {
        self.player
            .play(Self::destination(name), track(first), None)
            .await
            .expect("play failed");
        for id in rest {
            self.provider.add(id, vec![track(id)]);
            self.player
                .add_to_queue(&Self::key(name), id, None)
                .await
                .expect("enqueue failed");
        }
    }

    pub async fn next_event(&mut self) -> EventKind {
        let event = tokio::time::timeout(Duration::from_secs(2), self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed");
        event.kind
    }

    pub fn assert_quiet(&mut self) {
        match self.events.try_recv() {
            Err(broadcast::error::TryRecvError::Empty) => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
