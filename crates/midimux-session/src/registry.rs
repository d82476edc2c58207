//! Process-wide table of named sessions.
//!
//! State machine per session name: ABSENT -> ACTIVE on a sequencer claim,
//! back to ABSENT when that sequencer disconnects (which also evicts every
//! track connection). Sessions are plain values owned by the registry; the
//! registry itself is owned at the process boundary and passed by reference
//! to handlers.

use crate::error::{ClaimError, JoinError};
use crate::session::Session;
use midimux_core::events::{EventBus, Subscription};
use midimux_core::{ConnectionId, TrackId};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

/// Default round-counter ceiling for new sessions.
pub const DEFAULT_MAX_ROUNDS: u32 = 20;

/// Result of a successful track join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotAssignment {
    pub session: String,
    pub track: TrackId,
    pub connection: ConnectionId,
}

/// Broadcasts emitted toward the transport layer.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    TrackJoined {
        session: String,
        initials: String,
        track: TrackId,
        connection: ConnectionId,
    },
    TrackLeft {
        session: String,
        track: TrackId,
        initials: String,
        connection: ConnectionId,
    },
    SessionClaimRejected {
        session: String,
        connection: ConnectionId,
        reason: String,
    },
    SessionUnavailable {
        session: String,
        connection: ConnectionId,
        reason: String,
    },
    /// Sequencer went away; every listed track connection must be told to
    /// exit before the session disappears.
    SessionEnded {
        session: String,
        evicted: Vec<ConnectionId>,
    },
}

pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    max_tracks: usize,
    max_rounds: u32,
    events: EventBus<SessionEvent>,
}

impl SessionRegistry {
    pub fn new(max_tracks: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            max_tracks,
            max_rounds: DEFAULT_MAX_ROUNDS,
            events: EventBus::new(),
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Observe broadcasts (joins, departures, rejections, teardowns).
    pub fn subscribe(&self) -> Subscription<SessionEvent> {
        self.events.subscribe()
    }

    /// A sequencer claims `name`. Only an ABSENT name can be claimed; a
    /// duplicate claim is refused and the existing session is untouched.
    pub fn claim(&mut self, name: &str, connection: ConnectionId) -> Result<(), ClaimError> {
        if self.sessions.contains_key(name) {
            warn!(session = name, "sequencer claim rejected: already exists");
            self.events.publish(&SessionEvent::SessionClaimRejected {
                session: name.to_string(),
                connection,
                reason: format!("Session '{name}' already has a sequencer. Choose a different name."),
            });
            return Err(ClaimError::AlreadyExists(name.to_string()));
        }

        let mut session = Session::new(name, self.max_tracks, self.max_rounds);
        session.set_sequencer(connection);
        self.sessions.insert(name.to_string(), session);
        info!(session = name, "sequencer claimed session");
        Ok(())
    }

    /// A track joins `name`, taking the lowest free slot.
    pub fn join(
        &mut self,
        name: &str,
        connection: ConnectionId,
        initials: &str,
    ) -> Result<SlotAssignment, JoinError> {
        let Some(session) = self.sessions.get_mut(name) else {
            self.events.publish(&SessionEvent::SessionUnavailable {
                session: name.to_string(),
                connection,
                reason: "Session not available. Make sure sequencer is running.".to_string(),
            });
            return Err(JoinError::NotAvailable(name.to_string()));
        };

        let Some(track) = session.allocate(connection.clone(), initials) else {
            self.events.publish(&SessionEvent::SessionUnavailable {
                session: name.to_string(),
                connection,
                reason: "Session is full. No available tracks.".to_string(),
            });
            return Err(JoinError::Full(name.to_string()));
        };

        info!(session = name, %track, initials, "track joined session");
        self.events.publish(&SessionEvent::TrackJoined {
            session: name.to_string(),
            initials: initials.to_string(),
            track,
            connection: connection.clone(),
        });
        Ok(SlotAssignment {
            session: name.to_string(),
            track,
            connection,
        })
    }

    /// A track connection leaves `name`; its slot is freed (slot indices are
    /// reusable, routing persistence is the sequencer's concern).
    pub fn release(&mut self, name: &str, connection: &ConnectionId) -> Option<SlotAssignment> {
        let session = self.sessions.get_mut(name)?;
        let (track, participant) = session.release(connection)?;

        info!(session = name, %track, initials = %participant.initials, "track left session");
        self.events.publish(&SessionEvent::TrackLeft {
            session: name.to_string(),
            track,
            initials: participant.initials,
            connection: connection.clone(),
        });
        Some(SlotAssignment {
            session: name.to_string(),
            track,
            connection: connection.clone(),
        })
    }

    /// The sequencer of `name` disconnected: broadcast termination, evict all
    /// track connections, and delete the session entirely.
    pub fn sequencer_disconnected(&mut self, name: &str) -> Vec<ConnectionId> {
        let Some(mut session) = self.sessions.remove(name) else {
            return Vec::new();
        };
        let evicted = session.connections();
        session.clear();

        info!(session = name, evicted = evicted.len(), "sequencer disconnected, session ended");
        self.events.publish(&SessionEvent::SessionEnded {
            session: name.to_string(),
            evicted: evicted.clone(),
        });
        evicted
    }

    /// Route a raw disconnect to the right transition: session teardown when
    /// the connection was a sequencer, slot release when it was a track.
    pub fn disconnect(&mut self, connection: &ConnectionId) {
        if let Some(name) = self
            .sessions
            .iter()
            .find(|(_, s)| s.sequencer() == Some(connection))
            .map(|(name, _)| name.clone())
        {
            self.sequencer_disconnected(&name);
            return;
        }

        if let Some(name) = self.find_by_connection(connection) {
            let name = name.to_string();
            self.release(&name, connection);
        }
    }

    pub fn session(&self, name: &str) -> Option<&Session> {
        self.sessions.get(name)
    }

    pub fn set_playing(&mut self, name: &str, playing: bool) -> bool {
        match self.sessions.get_mut(name) {
            Some(session) => {
                session.set_playing(playing);
                true
            }
            None => false,
        }
    }

    /// Session holding `connection` in a track slot, if any.
    pub fn find_by_connection(&self, connection: &ConnectionId) -> Option<&str> {
        self.sessions
            .iter()
            .find(|(_, s)| s.slot_of(connection).is_some())
            .map(|(name, _)| name.as_str())
    }

    pub fn session_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(2)
    }

    #[test]
    fn test_claim_then_join() {
        let mut registry = registry();
        registry.claim("jam1", ConnectionId::new("seq")).unwrap();

        let assignment = registry
            .join("jam1", ConnectionId::new("t1"), "AB")
            .unwrap();
        assert_eq!(assignment.track, TrackId(0));
        assert_eq!(registry.session("jam1").unwrap().occupied(), 1);
    }

    #[test]
    fn test_duplicate_claim_rejected_without_side_effects() {
        let mut registry = registry();
        let events = registry.subscribe();
        registry.claim("jam1", ConnectionId::new("seq1")).unwrap();
        registry.join("jam1", ConnectionId::new("t1"), "AB").unwrap();

        let err = registry.claim("jam1", ConnectionId::new("seq2")).unwrap_err();
        assert_eq!(err, ClaimError::AlreadyExists("jam1".to_string()));

        // First claim's session untouched: same sequencer, track still there.
        let session = registry.session("jam1").unwrap();
        assert_eq!(session.sequencer(), Some(&ConnectionId::new("seq1")));
        assert_eq!(session.occupied(), 1);

        assert!(events.drain().iter().any(|e| matches!(
            e,
            SessionEvent::SessionClaimRejected { session, .. } if session == "jam1"
        )));
    }

    #[test]
    fn test_join_absent_session_rejected() {
        let mut registry = registry();
        let events = registry.subscribe();

        let err = registry
            .join("nope", ConnectionId::new("t1"), "AB")
            .unwrap_err();
        assert_eq!(err, JoinError::NotAvailable("nope".to_string()));
        assert!(registry.is_empty());

        assert!(events.drain().iter().any(|e| matches!(
            e,
            SessionEvent::SessionUnavailable { session, .. } if session == "nope"
        )));
    }

    #[test]
    fn test_full_session_rejects_third_join() {
        let mut registry = registry(); // capacity 2
        registry.claim("jam1", ConnectionId::new("seq")).unwrap();
        registry.join("jam1", ConnectionId::new("t1"), "AA").unwrap();
        registry.join("jam1", ConnectionId::new("t2"), "BB").unwrap();

        let err = registry
            .join("jam1", ConnectionId::new("t3"), "CC")
            .unwrap_err();
        assert_eq!(err, JoinError::Full("jam1".to_string()));

        // Existing slots unaffected.
        let session = registry.session("jam1").unwrap();
        assert_eq!(session.slot_of(&ConnectionId::new("t1")), Some(TrackId(0)));
        assert_eq!(session.slot_of(&ConnectionId::new("t2")), Some(TrackId(1)));
    }

    #[test]
    fn test_release_frees_slot_and_broadcasts() {
        let mut registry = registry();
        registry.claim("jam1", ConnectionId::new("seq")).unwrap();
        registry.join("jam1", ConnectionId::new("t1"), "AA").unwrap();
        let events = registry.subscribe();

        let released = registry.release("jam1", &ConnectionId::new("t1")).unwrap();
        assert_eq!(released.track, TrackId(0));

        assert!(matches!(
            events.try_recv(),
            Some(SessionEvent::TrackLeft { track: TrackId(0), .. })
        ));

        // Slot is reusable.
        let again = registry.join("jam1", ConnectionId::new("t9"), "ZZ").unwrap();
        assert_eq!(again.track, TrackId(0));
    }

    #[test]
    fn test_sequencer_disconnect_tears_down_session() {
        let mut registry = registry();
        registry.claim("jam1", ConnectionId::new("seq")).unwrap();
        registry.join("jam1", ConnectionId::new("t1"), "AA").unwrap();
        registry.join("jam1", ConnectionId::new("t2"), "BB").unwrap();
        let events = registry.subscribe();

        let evicted = registry.sequencer_disconnected("jam1");
        assert_eq!(
            evicted,
            vec![ConnectionId::new("t1"), ConnectionId::new("t2")]
        );
        assert!(registry.session("jam1").is_none());

        // The name is ABSENT again and can be claimed fresh.
        assert!(matches!(
            events.try_recv(),
            Some(SessionEvent::SessionEnded { .. })
        ));
        assert!(registry.claim("jam1", ConnectionId::new("seq2")).is_ok());
    }

    #[test]
    fn test_disconnect_routes_by_role() {
        let mut registry = registry();
        registry.claim("jam1", ConnectionId::new("seq")).unwrap();
        registry.join("jam1", ConnectionId::new("t1"), "AA").unwrap();

        // Track disconnect frees the slot but keeps the session.
        registry.disconnect(&ConnectionId::new("t1"));
        assert!(registry.session("jam1").is_some());
        assert_eq!(registry.session("jam1").unwrap().occupied(), 0);

        // Sequencer disconnect removes the session.
        registry.disconnect(&ConnectionId::new("seq"));
        assert!(registry.session("jam1").is_none());
    }

    #[test]
    fn test_session_names_are_case_sensitive() {
        let mut registry = registry();
        registry.claim("Jam", ConnectionId::new("s1")).unwrap();
        registry.claim("jam", ConnectionId::new("s2")).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_is_playing_flag() {
        let mut registry = registry();
        registry.claim("jam1", ConnectionId::new("seq")).unwrap();

        assert!(!registry.session("jam1").unwrap().is_playing());
        assert!(registry.set_playing("jam1", true));
        assert!(registry.session("jam1").unwrap().is_playing());
        assert!(!registry.set_playing("nope", true));
    }
}
