//! Playback controller.
//!
//! [`Player`] is the command surface: it resolves sessions by key, checks
//! preconditions and forwards work to the session's worker.

use std::sync::Arc;
use std::time::Duration;

use cadence_core::{Error, FilterKind, FilterSet, Requester, Result, Track, Volume};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::PlayerOptions;
use crate::event::PlayerEvent;
use crate::pipeline::{first_result, StreamPipeline, TrackProvider, TrackRequest};
use crate::registry::SessionRegistry;
use crate::session::{QueueSnapshot, Session, TrackSelector};
use crate::transport::{Destination, SessionKey, VoiceTransport};
use crate::watcher::MembershipWatcher;
use crate::worker::{self, Command, Eviction, SessionHandle, WorkerContext};

/// Drives one playback session per key.
#[derive(Clone)]
pub struct Player {
    provider: Arc<dyn TrackProvider>,
    transport: Arc<dyn VoiceTransport>,
    context: WorkerContext,
}

impl Player {
    /// Create a player over the given collaborators.
    pub fn new(
        provider: Arc<dyn TrackProvider>,
        transport: Arc<dyn VoiceTransport>,
        pipeline: Arc<dyn StreamPipeline>,
        options: PlayerOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        Self {
            provider,
            transport,
            context: WorkerContext {
                pipeline,
                registry: Arc::new(SessionRegistry::new()),
                events,
                options: Arc::new(options),
            },
        }
    }

    /// Subscribe to events from every session.
    ///
    /// Events go out on a bounded broadcast channel sized by
    /// `event_capacity`. A receiver that falls further behind than that gets
    /// [`broadcast::error::RecvError::Lagged`] and loses the oldest events,
    /// including `End`, `Stop` and `ChannelEmpty`.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.context.events.subscribe()
    }

    pub fn options(&self) -> &PlayerOptions {
        &self.context.options
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.context.registry
    }

    /// Watcher that evicts sessions whose destination has emptied.
    pub fn membership_watcher(&self) -> MembershipWatcher {
        MembershipWatcher::new(
            Arc::clone(&self.context.registry),
            Arc::clone(&self.context.options),
        )
    }

    /// Start a fresh session on `destination` with `request` as its first
    /// track. Any session already bound to the key is torn down first.
    ///
    /// Resolves once the track's pipeline has started.
    pub async fn play(
        &self,
        destination: Destination,
        request: impl Into<TrackRequest>,
        requester: Option<Requester>,
    ) -> Result<Track> {
        destination.validate()?;
        let track = request
            .into()
            .resolve(self.provider.as_ref(), requester)
            .await?;

        if let Some(existing) = self.context.registry.find(&destination.key) {
            info!("Replacing existing session for {}", destination.key);
            let eviction = Eviction::Replaced {
                by: destination.id.clone(),
            };
            self.evict(&existing, eviction).await;
        }

        let connection = self.transport.join(&destination).await?;
        connection.ready().await?;

        info!(
            "Starting {} on {} for {}",
            track.display_name(),
            destination.name,
            destination.key
        );
        let by = destination.id.clone();
        let mut session = Session::new(destination, self.context.options.initial_volume);
        session.push(track);

        let handle = worker::spawn(session, connection, self.context.clone());
        if let Some(displaced) = self.context.registry.insert(handle.clone()) {
            // Another play for the same key won the race; only one survives.
            self.evict(&displaced, Eviction::Replaced { by }).await;
        }

        handle.request(Command::Start).await
    }

    pub async fn pause(&self, key: &SessionKey) -> Result<Track> {
        self.session(key)?.request(Command::Pause).await
    }

    pub async fn resume(&self, key: &SessionKey) -> Result<Track> {
        self.session(key)?.request(Command::Resume).await
    }

    /// Stop playback and drop the session.
    pub async fn stop(&self, key: &SessionKey) -> Result<()> {
        self.session(key)?.request(Command::Stop).await
    }

    /// Set the volume in percent. Values outside 0..=100 are passed through.
    pub async fn set_volume(&self, key: &SessionKey, percent: u16) -> Result<()> {
        let volume = Volume::from_percent(percent);
        self.session(key)?
            .request(|reply| Command::SetVolume(volume, reply))
            .await
    }

    /// Toggle filters and restart the current track where it was.
    pub async fn update_filters(
        &self,
        key: &SessionKey,
        toggles: impl IntoIterator<Item = (FilterKind, bool)>,
    ) -> Result<()> {
        let session = self.session(key)?;
        let toggles: Vec<_> = toggles.into_iter().collect();
        session
            .request(|reply| Command::UpdateFilters(toggles, reply))
            .await
    }

    /// Append the first search result for `query`.
    pub async fn add_to_queue(
        &self,
        key: &SessionKey,
        query: &str,
        requester: Option<Requester>,
    ) -> Result<Track> {
        let session = self.session(key)?;
        let track = first_result(self.provider.as_ref(), query)
            .await?
            .requested_by_user(requester);
        session
            .request(|reply| Command::Enqueue(track, reply))
            .await
    }

    /// Replace everything after the current track.
    pub async fn set_queue(&self, key: &SessionKey, tracks: Vec<Track>) -> Result<QueueSnapshot> {
        self.session(key)?
            .request(|reply| Command::SetQueue(tracks, reply))
            .await
    }

    /// Drop everything but the current track.
    pub async fn clear_queue(&self, key: &SessionKey) -> Result<QueueSnapshot> {
        self.session(key)?.request(Command::ClearQueue).await
    }

    /// Skip the current track, returning it.
    pub async fn skip(&self, key: &SessionKey) -> Result<Track> {
        self.session(key)?.request(Command::Skip).await
    }

    pub async fn now_playing(&self, key: &SessionKey) -> Result<Track> {
        self.session(key)?.request(Command::NowPlaying).await
    }

    pub async fn set_repeat_mode(&self, key: &SessionKey, enabled: bool) -> Result<()> {
        self.session(key)?
            .request(|reply| Command::SetRepeat(enabled, reply))
            .await
    }

    /// Shuffle the pending tracks. The current track stays first.
    pub async fn shuffle(&self, key: &SessionKey) -> Result<QueueSnapshot> {
        self.session(key)?.request(Command::Shuffle).await
    }

    /// Remove a pending track. `Ok(None)` when nothing matched.
    pub async fn remove(
        &self,
        key: &SessionKey,
        selector: impl Into<TrackSelector>,
    ) -> Result<Option<Track>> {
        let selector = selector.into();
        self.session(key)?
            .request(|reply| Command::Remove(selector, reply))
            .await
    }

    /// Snapshot of the session's queue, if the session exists.
    pub async fn get_queue(&self, key: &SessionKey) -> Option<QueueSnapshot> {
        let session = self.context.registry.find(key)?;
        session.request(Command::Snapshot).await.ok()
    }

    pub fn is_playing(&self, key: &SessionKey) -> bool {
        self.context.registry.contains(key)
    }

    /// Position in the current track, accounting for filter restarts.
    pub async fn position(&self, key: &SessionKey) -> Result<Duration> {
        self.session(key)?.request(Command::Position).await
    }

    pub async fn filters(&self, key: &SessionKey) -> Result<FilterSet> {
        let snapshot = self.session(key)?.request(Command::Snapshot).await?;
        Ok(snapshot.filters)
    }

    /// Keys of every live session.
    pub fn sessions(&self) -> Vec<SessionKey> {
        self.context.registry.keys()
    }

    fn session(&self, key: &SessionKey) -> Result<SessionHandle> {
        self.context
            .registry
            .find(key)
            .ok_or_else(|| Error::SessionNotFound(key.to_string()))
    }

    async fn evict(&self, session: &SessionHandle, eviction: Eviction) {
        if let Err(e) = session
            .request(|reply| Command::Evict(eviction, reply))
            .await
        {
            debug!("Session {} was already gone: {e}", session.key());
        }
    }
}
