//! Session-scoped MIDI routing engine.
//!
//! One sequencer process owns a [`RoutingMatrix`] (who occupies which track
//! slot, where each track's messages go), a [`DeviceDirectory`] (destinations
//! and the hardware send primitive), and a [`MidiRouter`] that validates,
//! transforms, and dispatches each message.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use midimux_core::{
//!     ConnectionId, DeviceDirectory, DeviceId, MemorySink, MidiRouter, RoutingMatrix,
//!     RoutingUpdate, TrackId,
//! };
//!
//! let sink = Arc::new(MemorySink::new());
//! let matrix = Arc::new(RoutingMatrix::new());
//! let directory = Arc::new(DeviceDirectory::new(sink.clone()));
//! let router = MidiRouter::new(matrix.clone(), directory.clone());
//!
//! directory.interface_up("usb-1", "USB MIDI 1");
//! matrix.add_track(TrackId(0), ConnectionId::new("sock-1"), "AB");
//! matrix.update_routing(
//!     TrackId(0),
//!     &RoutingUpdate::new()
//!         .device(Some(DeviceId::RawInterface("usb-1".into())))
//!         .channel(3)
//!         .enabled(true),
//! ).unwrap();
//!
//! assert!(router.route_message(TrackId(0), &[0x90, 60, 100], 0));
//! assert_eq!(sink.sent()[0].bytes, vec![0x93, 60, 100]);
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod config;

mod types;
pub use types::{ConnectionId, DeviceId, TrackId, TrackStatus};

pub mod events;
pub use events::{EventBus, Subscription};

mod routing;
pub use routing::{
    MatrixRow, MatrixStats, RoutingChanged, RoutingEntry, RoutingMatrix, RoutingUpdate,
    TrackChange, TrackChangeAction, TrackPresence,
};

pub mod processor;

mod device;
pub use device::{
    ControllerDef, ControllerKind, DeviceDirectory, DeviceDocument, DeviceRecord, DeviceStatus,
    InterfaceInfo, MemorySink, MidiSink, ResolvedRoute, SentMessage,
};

#[cfg(feature = "midi-io")]
pub use device::HardwareSink;

pub mod scheduler;
pub use scheduler::{ManualScheduler, Scheduler, TaskHandle, ThreadScheduler};

mod router;
pub use router::{validate_message, MidiRouter, RouterStats, RoutingInfo};
