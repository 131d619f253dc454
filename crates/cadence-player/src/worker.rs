//! Session worker.
//!
//! Each session runs as its own task. Commands arrive through a mailbox and
//! pipeline signals through the active [`PipelineHandle`]; the worker handles
//! one of them at a time, so nothing against the same session ever overlaps.
//! A new pipeline is only opened after the previous one has been ended and
//! its finish observed.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use cadence_core::{Error, FilterKind, Result, Track, Volume};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::PlayerOptions;
use crate::event::{EventKind, PlayerEvent};
use crate::pipeline::{StreamOptions, StreamPipeline};
use crate::registry::SessionRegistry;
use crate::session::{Advance, PlaybackState, QueueSnapshot, Session, Teardown, TrackSelector};
use crate::transport::{
    Connection, Destination, DestinationId, PipelineHandle, PipelineSignal, SessionKey,
};

pub(crate) type Reply<T> = oneshot::Sender<Result<T>>;

/// Why a session is being shut down from outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Eviction {
    /// A new `play` took over the key on `by`. The connection stays joined
    /// only when `by` is the destination it is already on.
    Replaced { by: DestinationId },
    /// The destination emptied out.
    ChannelEmpty,
}

/// Requests handled by a session worker.
pub(crate) enum Command {
    Start(Reply<Track>),
    Pause(Reply<Track>),
    Resume(Reply<Track>),
    Stop(Reply<()>),
    SetVolume(Volume, Reply<()>),
    UpdateFilters(Vec<(FilterKind, bool)>, Reply<()>),
    Enqueue(Track, Reply<Track>),
    SetQueue(Vec<Track>, Reply<QueueSnapshot>),
    ClearQueue(Reply<QueueSnapshot>),
    Skip(Reply<Track>),
    NowPlaying(Reply<Track>),
    SetRepeat(bool, Reply<()>),
    Shuffle(Reply<QueueSnapshot>),
    Remove(TrackSelector, Reply<Option<Track>>),
    Snapshot(Reply<QueueSnapshot>),
    Position(Reply<Duration>),
    Evict(Eviction, Reply<()>),
}

/// Cheap, cloneable address of a running session.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    destination: Destination,
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    /// Unique per session instance, so a replaced session can be told apart
    /// from its successor under the same key.
    pub const fn id(&self) -> Uuid {
        self.id
    }

    pub const fn key(&self) -> &SessionKey {
        &self.destination.key
    }

    pub const fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Send a command and wait for the worker's answer. A worker that is gone
    /// means the session no longer exists.
    pub(crate) async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| self.gone())?;
        answer.await.map_err(|_| self.gone())?
    }

    fn gone(&self) -> Error {
        Error::SessionNotFound(self.key().to_string())
    }

    /// A handle with no worker behind it.
    #[cfg(test)]
    pub(crate) fn detached(destination: Destination) -> Self {
        let (commands, _) = mpsc::unbounded_channel();
        Self {
            id: Uuid::new_v4(),
            destination,
            commands,
        }
    }
}

/// Shared collaborators every worker needs.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub pipeline: Arc<dyn StreamPipeline>,
    pub registry: Arc<SessionRegistry>,
    pub events: broadcast::Sender<PlayerEvent>,
    pub options: Arc<PlayerOptions>,
}

/// Start a worker for `session` and return its handle. The caller registers
/// the handle before sending `Start`.
pub(crate) fn spawn(
    session: Session,
    connection: Arc<dyn Connection>,
    context: WorkerContext,
) -> SessionHandle {
    let (commands, mailbox) = mpsc::unbounded_channel();
    let handle = SessionHandle {
        id: Uuid::new_v4(),
        destination: session.destination().clone(),
        commands,
    };

    let worker = SessionWorker {
        id: handle.id,
        session,
        connection,
        context,
        active: None,
        last_failure: None,
    };
    tokio::spawn(worker.run(mailbox));

    handle
}

struct SessionWorker {
    id: Uuid,
    session: Session,
    connection: Arc<dyn Connection>,
    context: WorkerContext,
    /// Pipeline currently streaming, if any.
    active: Option<PipelineHandle>,
    /// Message of the most recent pipeline failure.
    last_failure: Option<String>,
}

impl SessionWorker {
    async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<Command>) {
        info!(
            "Session {} started on {}",
            self.session.key(),
            self.session.destination().name
        );

        loop {
            let flow = tokio::select! {
                command = mailbox.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("Command channel closed for {}", self.session.key());
                        self.end_active().await;
                        ControlFlow::Break(())
                    }
                },
                signal = next_signal(&mut self.active) => self.handle_signal(signal).await,
            };

            if flow.is_break() {
                break;
            }
        }

        debug!("Session {} worker exited", self.session.key());
    }

    async fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Start(reply) => {
                let flow = self.advance(true).await;
                let result = match (flow, self.session.current()) {
                    (ControlFlow::Continue(()), Some(track)) => Ok(track.clone()),
                    _ => Err(Error::Pipeline(self.last_failure.take().unwrap_or_else(
                        || "session ended before playback started".to_string(),
                    ))),
                };
                let _ = reply.send(result);
                return flow;
            }
            Command::Pause(reply) => {
                let _ = reply.send(self.set_paused(true));
            }
            Command::Resume(reply) => {
                let _ = reply.send(self.set_paused(false));
            }
            Command::Stop(reply) => {
                info!("Stopping session {}", self.session.key());
                self.session.mark_stopped();
                self.end_active().await;
                let flow = self.advance(true).await;
                let _ = reply.send(Ok(()));
                return flow;
            }
            Command::SetVolume(volume, reply) => {
                debug!("Volume set to {}%", volume.percent());
                self.session.set_volume(volume);
                self.connection.set_gain(volume.gain());
                let _ = reply.send(Ok(()));
            }
            Command::UpdateFilters(toggles, reply) => {
                return self.update_filters(toggles, reply).await;
            }
            Command::Enqueue(track, reply) => {
                debug!("Queued {} in {}", track.display_name(), self.session.key());
                self.session.push(track.clone());
                let _ = reply.send(Ok(track));
            }
            Command::SetQueue(tracks, reply) => {
                self.session.set_queue(tracks);
                let _ = reply.send(Ok(self.session.snapshot()));
            }
            Command::ClearQueue(reply) => {
                self.session.clear_queue();
                let _ = reply.send(Ok(self.session.snapshot()));
            }
            Command::Skip(reply) => {
                let skipped = match self.current_track() {
                    Ok(track) => track,
                    Err(e) => {
                        let _ = reply.send(Err(e));
                        return ControlFlow::Continue(());
                    }
                };
                info!("Skipping {}", skipped.display_name());
                self.session.mark_skipped();
                self.end_active().await;
                let _ = reply.send(Ok(skipped));
                // An explicit skip always leaves the current track.
                return self.advance(false).await;
            }
            Command::NowPlaying(reply) => {
                let _ = reply.send(self.current_track());
            }
            Command::SetRepeat(repeat, reply) => {
                debug!("Repeat mode {} for {}", repeat, self.session.key());
                self.session.set_repeat(repeat);
                let _ = reply.send(Ok(()));
            }
            Command::Shuffle(reply) => {
                self.session.shuffle();
                let _ = reply.send(Ok(self.session.snapshot()));
            }
            Command::Remove(selector, reply) => {
                let _ = reply.send(Ok(self.session.remove(&selector)));
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(Ok(self.session.snapshot()));
            }
            Command::Position(reply) => {
                let _ = reply.send(Ok(self.position()));
            }
            Command::Evict(eviction, reply) => {
                self.evict(eviction).await;
                let _ = reply.send(Ok(()));
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }

    async fn handle_signal(&mut self, signal: PipelineSignal) -> ControlFlow<()> {
        match signal {
            PipelineSignal::Start => {
                trace!("Ignoring repeated start signal");
                ControlFlow::Continue(())
            }
            PipelineSignal::Finish => {
                self.active = None;
                debug!("Pipeline finished for {}", self.session.key());
                self.advance(true).await
            }
            PipelineSignal::Error(message) => {
                self.active = None;
                self.report_failure(message);
                self.advance(false).await
            }
        }
    }

    /// Move past a finished pipeline: replay, start the next track, or tear
    /// the session down. Tracks that fail to start are reported and skipped.
    async fn advance(&mut self, mut allow_repeat: bool) -> ControlFlow<()> {
        loop {
            let skipped = self.session.take_skipped();
            let (previous, announce) = match self.session.advance(allow_repeat) {
                Advance::Teardown(reason) => {
                    self.teardown(reason).await;
                    return ControlFlow::Break(());
                }
                Advance::Replay => (self.session.current().cloned(), true),
                Advance::Next {
                    previous,
                    first_play,
                } => {
                    self.session.set_paused(false);
                    (previous, !first_play)
                }
            };

            match self.start_pipeline(Duration::ZERO).await {
                Ok(()) => {
                    if announce {
                        if let Some(track) = self.session.current().cloned() {
                            self.emit(EventKind::TrackChanged {
                                track,
                                previous,
                                skipped,
                                repeat: self.session.repeat(),
                            });
                        }
                    }
                    return ControlFlow::Continue(());
                }
                Err(e) => {
                    self.report_failure(failure_message(e));
                    allow_repeat = false;
                }
            }
        }
    }

    /// Open a pipeline for the current track and wait for it to start.
    async fn start_pipeline(&mut self, seek: Duration) -> Result<()> {
        let track = self.current_track()?;
        let options = StreamOptions {
            seek,
            filters: self.session.filters().enabled(),
        };

        debug!(
            "Opening {} at {:.1}s with {} filter(s)",
            track.display_name(),
            seek.as_secs_f64(),
            options.filters.len()
        );
        self.session.set_state(PlaybackState::Starting);

        let stream = self.context.pipeline.open(&track, &options).await?;
        let mut handle = self.connection.play(stream).await?;
        match handle.next().await {
            PipelineSignal::Start => {}
            PipelineSignal::Finish => {
                return Err(Error::Pipeline(format!(
                    "{} finished before it started",
                    track.display_name()
                )));
            }
            PipelineSignal::Error(message) => return Err(Error::Pipeline(message)),
        }

        self.connection.set_gain(self.session.gain());
        if self.session.is_paused() {
            self.connection.pause();
        }
        self.session.mark_started(seek);
        self.active = Some(handle);

        info!(
            "Now playing {} in {}",
            track.display_name(),
            self.session.key()
        );
        Ok(())
    }

    /// End the active pipeline and wait until it reports back.
    async fn end_active(&mut self) {
        let Some(mut handle) = self.active.take() else {
            return;
        };
        self.connection.end();
        while let PipelineSignal::Start = handle.next().await {}
        trace!("Pipeline ended for {}", self.session.key());
    }

    /// Restart the current track at the current position with new filters.
    async fn update_filters(
        &mut self,
        toggles: Vec<(FilterKind, bool)>,
        reply: Reply<()>,
    ) -> ControlFlow<()> {
        self.session.merge_filters(toggles);
        if self.active.is_none() {
            let _ = reply.send(Ok(()));
            return ControlFlow::Continue(());
        }

        let position = self.position();
        debug!(
            "Restarting {} at {:.1}s for filter change",
            self.session.key(),
            position.as_secs_f64()
        );
        self.end_active().await;

        match self.start_pipeline(position).await {
            Ok(()) => {
                let _ = reply.send(Ok(()));
                ControlFlow::Continue(())
            }
            Err(e) => {
                let message = failure_message(e);
                self.report_failure(message.clone());
                let _ = reply.send(Err(Error::Pipeline(message)));
                self.advance(false).await
            }
        }
    }

    fn set_paused(&mut self, paused: bool) -> Result<Track> {
        let track = self.current_track()?;
        if paused {
            self.connection.pause();
        } else {
            self.connection.resume();
        }
        self.session.set_paused(paused);
        debug!(
            "{} {}",
            if paused { "Paused" } else { "Resumed" },
            self.session.key()
        );
        Ok(track)
    }

    fn current_track(&self) -> Result<Track> {
        self.session
            .current()
            .cloned()
            .ok_or_else(|| Error::Internal(format!("{} has no current track", self.session.key())))
    }

    /// Absolute position in the current track.
    fn position(&self) -> Duration {
        let elapsed = if self.active.is_some() {
            self.connection.elapsed()
        } else {
            Duration::ZERO
        };
        self.session.stream_offset() + elapsed
    }

    async fn teardown(&mut self, reason: Teardown) {
        let (leave, kind) = match reason {
            Teardown::Ended => {
                info!("Queue finished for {}", self.session.key());
                (self.context.options.leave_on_end, EventKind::End)
            }
            Teardown::Stopped => {
                info!("Playback stopped for {}", self.session.key());
                (self.context.options.leave_on_stop, EventKind::Stop)
            }
        };

        self.session.set_state(PlaybackState::Stopped);
        self.context
            .registry
            .remove_session(self.session.key(), self.id);
        if leave {
            self.connection.leave().await;
        }
        self.emit(kind);
    }

    async fn evict(&mut self, eviction: Eviction) {
        self.end_active().await;
        self.session.set_state(PlaybackState::Stopped);
        self.context
            .registry
            .remove_session(self.session.key(), self.id);

        match eviction {
            Eviction::Replaced { by } if by == self.session.destination().id => {
                debug!("Session {} replaced", self.session.key());
            }
            Eviction::Replaced { by } => {
                info!(
                    "Session {} moved to {by}, leaving {}",
                    self.session.key(),
                    self.session.destination().name
                );
                self.connection.leave().await;
            }
            Eviction::ChannelEmpty => {
                info!(
                    "{} is empty, leaving {}",
                    self.session.destination().name,
                    self.session.key()
                );
                self.connection.leave().await;
                self.emit(EventKind::ChannelEmpty);
            }
        }
    }

    fn report_failure(&mut self, message: String) {
        let track = self.session.current().cloned();
        warn!(
            "Pipeline failed in {} ({}): {message}",
            self.session.key(),
            track.as_ref().map_or("no track", |t| t.title.as_str())
        );
        self.last_failure = Some(message.clone());
        self.emit(EventKind::PipelineError { track, message });
    }

    /// Nobody listening is not an error; the event is just dropped.
    fn emit(&self, kind: EventKind) {
        let event = PlayerEvent {
            key: self.session.key().clone(),
            kind,
        };
        if let Err(broadcast::error::SendError(event)) = self.context.events.send(event) {
            trace!("No subscribers for {:?} from {}", event.kind, event.key);
        }
    }
}

fn failure_message(error: Error) -> String {
    match error {
        Error::Pipeline(message) => message,
        other => other.to_string(),
    }
}

async fn next_signal(active: &mut Option<PipelineHandle>) -> PipelineSignal {
    match active {
        Some(handle) => handle.next().await,
        None => std::future::pending().await,
    }
}
