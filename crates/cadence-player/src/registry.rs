//! Keyed storage for live sessions.
//!
//! Sessions are indexed by [`SessionKey`] and, through a secondary index, by
//! the [`DestinationId`] they are bound to so membership changes resolve
//! without scanning.

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::transport::{DestinationId, SessionKey};
use crate::worker::SessionHandle;

/// Live sessions, at most one per key.
#[derive(Default)]
pub struct SessionRegistry {
    /// Primary: key -> handle
    sessions: DashMap<SessionKey, SessionHandle>,
    /// Secondary: destination -> key
    destinations: DashMap<DestinationId, SessionKey>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, replacing and returning any previous one for the
    /// same key. Tearing down the displaced session is up to the caller.
    pub fn insert(&self, handle: SessionHandle) -> Option<SessionHandle> {
        let key = handle.key().clone();
        let destination = handle.destination().id.clone();

        let previous = self.sessions.insert(key.clone(), handle);
        if let Some(previous) = &previous {
            let old_destination = &previous.destination().id;
            if *old_destination != destination {
                self.destinations
                    .remove_if(old_destination, |_, stored| *stored == key);
            }
            debug!("Replaced session {} ({})", key, previous.id());
        }
        self.destinations.insert(destination, key);
        previous
    }

    pub fn find(&self, key: &SessionKey) -> Option<SessionHandle> {
        self.sessions.get(key).map(|entry| entry.value().clone())
    }

    /// Session bound to a destination, via the secondary index.
    pub fn find_by_destination(&self, destination: &DestinationId) -> Option<SessionHandle> {
        let key = self.destinations.get(destination)?.value().clone();
        self.find(&key)
            .filter(|handle| handle.destination().id == *destination)
    }

    /// Remove whatever session is registered under `key`.
    pub fn remove(&self, key: &SessionKey) -> Option<SessionHandle> {
        let (_, handle) = self.sessions.remove(key)?;
        self.destinations
            .remove_if(&handle.destination().id, |_, stored| stored == key);
        Some(handle)
    }

    /// Remove the session under `key` only if it is still the one with `id`.
    /// A replaced session cleaning up after itself must not evict its
    /// successor.
    pub fn remove_session(&self, key: &SessionKey, id: Uuid) -> bool {
        let Some((_, handle)) = self.sessions.remove_if(key, |_, handle| handle.id() == id) else {
            return false;
        };
        self.destinations
            .remove_if(&handle.destination().id, |_, stored| stored == key);
        true
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.contains_key(key)
    }

    pub fn keys(&self) -> Vec<SessionKey> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
