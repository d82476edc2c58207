//! The send primitive behind the device directory.
//!
//! [`HardwareSink`] drives real interfaces through `midir` on a dedicated
//! thread; [`MemorySink`] captures sends for tests and embedders that bring
//! their own transport.

use crate::error::{Error, Result};
use parking_lot::Mutex;

/// One captured or outgoing hardware send.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub interface: String,
    pub bytes: Vec<u8>,
    pub timestamp_ms: u64,
}

/// Delivery primitive for fully resolved messages. Implementations must not
/// block the caller beyond queueing.
pub trait MidiSink: Send + Sync {
    fn send(&self, interface: &str, bytes: &[u8], timestamp_ms: u64) -> Result<()>;
}

/// Capturing sink. Records every send; can be switched into a failing mode to
/// exercise error paths.
#[derive(Default)]
pub struct MemorySink {
    sent: Mutex<Vec<SentMessage>>,
    failing: Mutex<bool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    /// When `failing` is set every send returns an error without recording.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

impl MidiSink for MemorySink {
    fn send(&self, interface: &str, bytes: &[u8], timestamp_ms: u64) -> Result<()> {
        if *self.failing.lock() {
            return Err(Error::Sink(format!("simulated failure on {interface}")));
        }
        self.sent.lock().push(SentMessage {
            interface: interface.to_string(),
            bytes: bytes.to_vec(),
            timestamp_ms,
        });
        Ok(())
    }
}

#[cfg(feature = "midi-io")]
pub use hardware::HardwareSink;

#[cfg(feature = "midi-io")]
mod hardware {
    use super::{MidiSink, SentMessage};
    use crate::error::{Error, Result};
    use crossbeam_channel::{bounded, Receiver, Sender};
    use midir::{MidiOutput, MidiOutputConnection};
    use std::collections::HashMap;
    use std::thread;
    use tracing::{debug, warn};

    enum Command {
        Connect(String),
        Disconnect(String),
        Send(SentMessage),
        Shutdown,
    }

    /// midir-backed sink. Port connections live on a dedicated worker thread;
    /// callers only enqueue commands.
    pub struct HardwareSink {
        commands: Sender<Command>,
    }

    impl HardwareSink {
        pub fn new() -> Self {
            let (commands, receiver) = bounded(1024);
            thread::Builder::new()
                .name("midimux-output".to_string())
                .spawn(move || Self::worker(receiver))
                .expect("failed to spawn MIDI output thread");
            Self { commands }
        }

        /// Open the named port; subsequent sends to `interface` use it.
        pub fn connect(&self, interface: &str) -> Result<()> {
            self.commands
                .send(Command::Connect(interface.to_string()))
                .map_err(|_| Error::Sink("MIDI output thread not running".to_string()))
        }

        pub fn disconnect(&self, interface: &str) {
            let _ = self.commands.send(Command::Disconnect(interface.to_string()));
        }

        /// Names of the ports currently offered by the OS.
        pub fn list_ports() -> Vec<String> {
            let mut names = Vec::new();
            if let Ok(output) = MidiOutput::new("midimux-port-list") {
                for port in output.ports() {
                    if let Ok(name) = output.port_name(&port) {
                        names.push(name);
                    }
                }
            }
            names
        }

        fn worker(receiver: Receiver<Command>) {
            let mut connections: HashMap<String, MidiOutputConnection> = HashMap::new();

            while let Ok(command) = receiver.recv() {
                match command {
                    Command::Connect(interface) => match Self::open_port(&interface) {
                        Ok(connection) => {
                            debug!(%interface, "MIDI output connected");
                            connections.insert(interface, connection);
                        }
                        Err(e) => warn!(%interface, error = %e, "MIDI connect failed"),
                    },
                    Command::Disconnect(interface) => {
                        if connections.remove(&interface).is_some() {
                            debug!(%interface, "MIDI output disconnected");
                        }
                    }
                    Command::Send(message) => {
                        if let Some(connection) = connections.get_mut(&message.interface) {
                            if let Err(e) = connection.send(&message.bytes) {
                                warn!(interface = %message.interface, error = %e, "MIDI send failed");
                            }
                        } else {
                            debug!(interface = %message.interface, "dropping send: port not open");
                        }
                    }
                    Command::Shutdown => break,
                }
            }
        }

        fn open_port(interface: &str) -> Result<MidiOutputConnection> {
            let output = MidiOutput::new("midimux-output")
                .map_err(|e| Error::Sink(e.to_string()))?;
            let port = output
                .ports()
                .into_iter()
                .find(|p| output.port_name(p).as_deref() == Ok(interface))
                .ok_or_else(|| Error::InterfaceUnavailable(interface.to_string()))?;
            output
                .connect(&port, "midimux")
                .map_err(|e| Error::Sink(e.to_string()))
        }
    }

    impl Default for HardwareSink {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for HardwareSink {
        fn drop(&mut self) {
            let _ = self.commands.send(Command::Shutdown);
        }
    }

    impl MidiSink for HardwareSink {
        fn send(&self, interface: &str, bytes: &[u8], timestamp_ms: u64) -> Result<()> {
            self.commands
                .try_send(Command::Send(SentMessage {
                    interface: interface.to_string(),
                    bytes: bytes.to_vec(),
                    timestamp_ms,
                }))
                .map_err(|_| Error::Sink("MIDI output queue full or closed".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.send("a", &[0x90, 60, 100], 1).unwrap();
        sink.send("b", &[0x80, 60, 0], 2).unwrap();

        let sent = sink.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].interface, "a");
        assert_eq!(sent[1].bytes, vec![0x80, 60, 0]);
    }

    #[test]
    fn test_memory_sink_failing_mode() {
        let sink = MemorySink::new();
        sink.set_failing(true);
        assert!(sink.send("a", &[0xF8], 0).is_err());
        assert!(sink.sent().is_empty());

        sink.set_failing(false);
        assert!(sink.send("a", &[0xF8], 0).is_ok());
    }
}
