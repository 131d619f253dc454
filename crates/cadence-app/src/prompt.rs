//! Line-oriented control prompt and event printer.

use std::ops::ControlFlow;

use anyhow::Result;
use cadence_core::{Requester, Track};
use cadence_player::{
    Destination, EventKind, MembershipEvent, Player, PlayerEvent, QueueSnapshot,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::commands::{self, Input, HELP};

/// Everything a prompt command acts on.
pub struct Prompt {
    pub player: Player,
    pub destination: Destination,
    pub requester: Requester,
    pub membership: mpsc::Sender<MembershipEvent>,
}

impl Prompt {
    /// Read commands from stdin until `quit` or end of input.
    pub async fn run(&self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("{HELP}");

        while let Some(line) = lines.next_line().await? {
            let input = match commands::parse(&line) {
                Ok(Some(input)) => input,
                Ok(None) => continue,
                Err(e) => {
                    println!("{e:#}");
                    continue;
                }
            };

            match self.execute(input).await {
                Ok(ControlFlow::Continue(())) => {}
                Ok(ControlFlow::Break(())) => break,
                Err(e) => println!("error: {e:#}"),
            }
        }

        if self.player.is_playing(&self.destination.key) {
            self.player.stop(&self.destination.key).await?;
        }
        Ok(())
    }

    async fn execute(&self, input: Input) -> Result<ControlFlow<()>> {
        let player = &self.player;
        let key = &self.destination.key;
        let requester = Some(self.requester.clone());

        match input {
            Input::Play(query) => {
                let track = player
                    .play(self.destination.clone(), query, requester)
                    .await?;
                println!("playing {}", describe(&track));
            }
            Input::Add(query) => {
                let track = player.add_to_queue(key, &query, requester).await?;
                println!("queued {}", describe(&track));
            }
            Input::Pause => {
                let track = player.pause(key).await?;
                println!("paused {}", track.title);
            }
            Input::Resume => {
                let track = player.resume(key).await?;
                println!("resumed {}", track.title);
            }
            Input::Skip => {
                let track = player.skip(key).await?;
                println!("skipped {}", track.title);
            }
            Input::Stop => player.stop(key).await?,
            Input::Volume(percent) => {
                player.set_volume(key, percent).await?;
                println!("volume {percent}%");
            }
            Input::Filter(toggles) => {
                player.update_filters(key, toggles).await?;
                self.print_filters().await?;
            }
            Input::Filters => self.print_filters().await?,
            Input::Repeat(enabled) => {
                player.set_repeat_mode(key, enabled).await?;
                println!("repeat {}", if enabled { "on" } else { "off" });
            }
            Input::Shuffle => print_queue(&player.shuffle(key).await?),
            Input::Queue => match player.get_queue(key).await {
                Some(snapshot) => print_queue(&snapshot),
                None => println!("nothing is playing"),
            },
            Input::Clear => print_queue(&player.clear_queue(key).await?),
            Input::Remove(index) => match player.remove(key, index).await? {
                Some(track) => println!("removed {}", track.title),
                None => println!("no track at position {}", index + 1),
            },
            Input::NowPlaying => {
                let track = player.now_playing(key).await?;
                let position = player.position(key).await?;
                println!(
                    "{} [{} / {}]",
                    describe(&track),
                    cadence_core::TrackDuration::from_seconds(position.as_secs()).format(),
                    track.duration.format()
                );
            }
            Input::Leave => {
                let event = MembershipEvent::left(self.destination.id.clone(), 1);
                if self.membership.send(event).await.is_err() {
                    warn!("Membership watcher is not running");
                }
            }
            Input::Help => println!("{HELP}"),
            Input::Quit => return Ok(ControlFlow::Break(())),
        }

        Ok(ControlFlow::Continue(()))
    }

    async fn print_filters(&self) -> Result<()> {
        let filters = self.player.filters(&self.destination.key).await?;
        let enabled: Vec<String> = filters.enabled().iter().map(ToString::to_string).collect();
        if enabled.is_empty() {
            println!("no filters enabled");
        } else {
            println!("filters: {}", enabled.join(", "));
        }
        Ok(())
    }
}

fn describe(track: &Track) -> String {
    format!("{} ({})", track.display_name(), track.duration.format())
}

fn print_queue(snapshot: &QueueSnapshot) {
    match &snapshot.current {
        Some(track) => println!(
            "now: {}{}",
            describe(track),
            if snapshot.is_paused() { " (paused)" } else { "" }
        ),
        None => println!("now: nothing"),
    }
    for (i, track) in snapshot.pending.iter().enumerate() {
        println!("{:>3}. {}", i + 1, describe(track));
    }
    println!(
        "volume {}%, repeat {}",
        snapshot.volume.percent(),
        if snapshot.repeat { "on" } else { "off" }
    );
}

/// Print player events until the channel closes.
pub async fn print_events(mut events: broadcast::Receiver<PlayerEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => print_event(&event),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                debug!("Event printer lagged by {missed} events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &PlayerEvent) {
    match &event.kind {
        EventKind::TrackChanged {
            track,
            skipped,
            repeat,
            ..
        } => {
            let note = match (skipped, repeat) {
                (true, _) => " (after skip)",
                (false, true) => " (repeat)",
                (false, false) => "",
            };
            println!("[{}] now playing {}{note}", event.key, describe(track));
        }
        EventKind::End => println!("[{}] queue finished", event.key),
        EventKind::Stop => println!("[{}] stopped", event.key),
        EventKind::ChannelEmpty => println!("[{}] everyone left, disconnected", event.key),
        EventKind::PipelineError { track, message } => println!(
            "[{}] playback error{}: {message}",
            event.key,
            track
                .as_ref()
                .map(|t| format!(" on {}", t.title))
                .unwrap_or_default()
        ),
    }
}
