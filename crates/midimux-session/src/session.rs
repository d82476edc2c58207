//! One named session: a single sequencer link plus a fixed array of track
//! slots filled first-available.

use midimux_core::{ConnectionId, TrackId};

/// Occupant of one track slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub connection: ConnectionId,
    pub initials: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    name: String,
    sequencer: Option<ConnectionId>,
    slots: Vec<Option<Participant>>,
    is_playing: bool,
    max_rounds: u32,
}

impl Session {
    pub fn new(name: impl Into<String>, capacity: usize, max_rounds: u32) -> Self {
        Self {
            name: name.into(),
            sequencer: None,
            slots: vec![None; capacity],
            is_playing: false,
            max_rounds,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    /// A session is joinable once its sequencer link is attached.
    pub fn is_ready(&self) -> bool {
        self.sequencer.is_some()
    }

    pub fn sequencer(&self) -> Option<&ConnectionId> {
        self.sequencer.as_ref()
    }

    pub(crate) fn set_sequencer(&mut self, connection: ConnectionId) {
        self.sequencer = Some(connection);
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.is_playing = playing;
    }

    /// Allocate the lowest-numbered free slot. A connection occupies at most
    /// one slot: joining again returns the slot it already holds.
    pub fn allocate(&mut self, connection: ConnectionId, initials: impl Into<String>) -> Option<TrackId> {
        if let Some(existing) = self.slot_of(&connection) {
            return Some(existing);
        }
        let free = self.slots.iter().position(|slot| slot.is_none())?;
        self.slots[free] = Some(Participant {
            connection,
            initials: initials.into(),
        });
        Some(TrackId(free as u16))
    }

    /// Free the slot held by `connection`, returning what occupied it.
    pub fn release(&mut self, connection: &ConnectionId) -> Option<(TrackId, Participant)> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.as_ref().map(|p| &p.connection) == Some(connection))?;
        let participant = self.slots[index].take()?;
        Some((TrackId(index as u16), participant))
    }

    pub fn slot_of(&self, connection: &ConnectionId) -> Option<TrackId> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().map(|p| &p.connection) == Some(connection))
            .map(|index| TrackId(index as u16))
    }

    pub fn participant(&self, track: TrackId) -> Option<&Participant> {
        self.slots.get(usize::from(track.0))?.as_ref()
    }

    pub fn initials_of(&self, connection: &ConnectionId) -> Option<&str> {
        self.slots
            .iter()
            .flatten()
            .find(|p| &p.connection == connection)
            .map(|p| p.initials.as_str())
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Track connections in slot order.
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.slots
            .iter()
            .flatten()
            .map(|p| p.connection.clone())
            .collect()
    }

    /// Free every slot. Slot indices stay reusable.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }
}
