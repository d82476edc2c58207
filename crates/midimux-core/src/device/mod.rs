//! Device directory: configured devices, attached interfaces, and the send
//! primitive the router dispatches through.

mod directory;
mod record;
mod sink;

pub use directory::{DeviceDirectory, InterfaceInfo, ResolvedRoute};
pub use record::{ControllerDef, ControllerKind, DeviceDocument, DeviceRecord, DeviceStatus};
pub use sink::{MemorySink, MidiSink, SentMessage};

#[cfg(feature = "midi-io")]
pub use sink::HardwareSink;
