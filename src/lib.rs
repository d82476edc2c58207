//! Session-scoped MIDI routing engine.
//!
//! Umbrella crate tying together the two subsystems:
//!
//! - [`core`] (`midimux-core`): the routing matrix, message processor,
//!   device directory, and router that turn a track's raw MIDI bytes into
//!   transformed bytes on a hardware interface.
//! - [`session`] (`midimux-session`): the server-side broker that maps
//!   transport connections onto session names and track slots.
//!
//! A typical server wires them per session: claim a name in the
//! [`session::SessionRegistry`], then feed each admitted track's messages to
//! that session's [`core::MidiRouter`] under the assigned
//! [`core::TrackId`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use midimux::prelude::*;
//!
//! let mut registry = SessionRegistry::new(16);
//! registry.claim("jam1", ConnectionId::new("seq")).unwrap();
//! let seat = registry.join("jam1", ConnectionId::new("sock-1"), "AB").unwrap();
//!
//! let sink = Arc::new(MemorySink::new());
//! let matrix = Arc::new(RoutingMatrix::new());
//! let directory = Arc::new(DeviceDirectory::new(sink.clone()));
//! let router = MidiRouter::new(matrix.clone(), directory.clone());
//!
//! directory.interface_up("usb-1", "USB MIDI 1");
//! matrix.add_track(seat.track, seat.connection.clone(), "AB");
//! matrix.update_routing(
//!     seat.track,
//!     &RoutingUpdate::new()
//!         .device(Some(DeviceId::RawInterface("usb-1".into())))
//!         .channel(2)
//!         .enabled(true),
//! ).unwrap();
//!
//! assert!(router.route_message(seat.track, &[0x90, 60, 100], 0));
//! assert_eq!(sink.sent()[0].bytes, vec![0x92, 60, 100]);
//! ```

pub use midimux_core as core;
pub use midimux_session as session;

/// Commonly used types, one import away.
pub mod prelude {
    pub use midimux_core::{
        validate_message, ConnectionId, DeviceDirectory, DeviceId, DeviceRecord, MemorySink,
        MidiRouter, MidiSink, RoutingEntry, RoutingMatrix, RoutingUpdate, TrackId, TrackStatus,
    };
    pub use midimux_session::{
        ClaimError, JoinError, SessionEvent, SessionRegistry, SlotAssignment,
    };
}
