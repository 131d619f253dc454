//! Destination membership watcher.
//!
//! Hosts forward occupancy changes of voice destinations here. When the last
//! listener leaves a destination with an active session, the session is
//! evicted and a `ChannelEmpty` event is emitted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::PlayerOptions;
use crate::registry::SessionRegistry;
use crate::transport::DestinationId;
use crate::worker::{Command, Eviction};

/// Direction of an occupancy change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipChange {
    Joined,
    Left,
}

/// A participant joined or left a destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipEvent {
    pub destination: DestinationId,
    pub change: MembershipChange,
    /// Occupants after the change, the player's own connection included.
    pub remaining: usize,
}

impl MembershipEvent {
    pub fn left(destination: DestinationId, remaining: usize) -> Self {
        Self {
            destination,
            change: MembershipChange::Left,
            remaining,
        }
    }

    pub fn joined(destination: DestinationId, remaining: usize) -> Self {
        Self {
            destination,
            change: MembershipChange::Joined,
            remaining,
        }
    }
}

/// Evicts sessions whose destination has nobody left to listen.
#[derive(Clone)]
pub struct MembershipWatcher {
    registry: Arc<SessionRegistry>,
    options: Arc<PlayerOptions>,
}

impl MembershipWatcher {
    pub(crate) const fn new(registry: Arc<SessionRegistry>, options: Arc<PlayerOptions>) -> Self {
        Self { registry, options }
    }

    /// Handle one notification. Returns true if a session was evicted.
    pub async fn handle(&self, event: &MembershipEvent) -> bool {
        if !self.options.leave_on_empty {
            return false;
        }
        if event.change != MembershipChange::Left || event.remaining > 1 {
            return false;
        }

        let Some(session) = self.registry.find_by_destination(&event.destination) else {
            return false;
        };

        info!(
            "Destination {} emptied, evicting session {}",
            event.destination,
            session.key()
        );
        match session
            .request(|reply| Command::Evict(Eviction::ChannelEmpty, reply))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                debug!("Session {} already gone: {e}", session.key());
                false
            }
        }
    }

    /// Consume notifications until the sender side is dropped.
    pub async fn run(self, mut events: mpsc::Receiver<MembershipEvent>) {
        debug!("Membership watcher started");
        while let Some(event) = events.recv().await {
            self.handle(&event).await;
        }
        debug!("Membership watcher stopped");
    }

    pub fn spawn(self, events: mpsc::Receiver<MembershipEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use super::*;
    use crate::event::EventKind;
    use crate::testing::Harness;

    fn voice(name: &str) -> DestinationId {
        DestinationId::new(format!("{name}-voice"))
    }

    #[tokio::test]
    async fn test_last_listener_leaving_evicts() {
        let mut h = Harness::new();
        h.start("g", "a", &["b"]).await;
        let watcher = h.player.membership_watcher();

        assert!(watcher.handle(&MembershipEvent::left(voice("g"), 1)).await);

        assert_eq!(h.next_event().await, EventKind::ChannelEmpty);
        assert!(!h.player.is_playing(&Harness::key("g")));
        assert!(h.connection("g").has_left());
    }

    #[tokio::test]
    async fn test_occupied_destination_is_kept() {
        let mut h = Harness::new();
        h.start("g", "a", &[]).await;
        let watcher = h.player.membership_watcher();

        assert!(!watcher.handle(&MembershipEvent::left(voice("g"), 2)).await);
        assert!(!watcher.handle(&MembershipEvent::joined(voice("g"), 1)).await);
        assert!(!watcher.handle(&MembershipEvent::left(voice("elsewhere"), 0)).await);

        assert!(h.player.is_playing(&Harness::key("g")));
        h.assert_quiet();
    }

    #[tokio::test]
    async fn test_disabled_watcher_ignores_everything() {
        let h = Harness::with_options(PlayerOptions {
            leave_on_empty: false,
            ..PlayerOptions::default()
        });
        h.start("g", "a", &[]).await;

        let watcher = h.player.membership_watcher();
        assert!(!watcher.handle(&MembershipEvent::left(voice("g"), 1)).await);
        assert!(h.player.is_playing(&Harness::key("g")));
    }

    #[tokio::test]
    async fn test_spawned_watcher_drains_channel() {
        let mut h = Harness::new();
        h.start("g", "a", &[]).await;
        let (tx, rx) = mpsc::channel(8);
        let task = h.player.membership_watcher().spawn(rx);

        tx.send(MembershipEvent::left(voice("g"), 1)).await.unwrap();
        assert_eq!(h.next_event().await, EventKind::ChannelEmpty);

        drop(tx);
        task.await.unwrap();
        assert!(h.player.sessions().is_empty());
    }
}
