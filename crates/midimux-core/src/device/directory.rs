//! Device directory: maps routing destinations to interfaces and dispatches
//! resolved messages through the send primitive.
//!
//! Configured devices resolve through their assigned interface; raw
//! interfaces resolve to themselves. Removing a device never breaks routing
//! entries that still point at it - such routes simply stop resolving and
//! their sends fail validation upstream.

use crate::config::{CC_ALL_NOTES_OFF, CC_ALL_SOUND_OFF, MIDI_CHANNELS};
use crate::device::record::{DeviceDocument, DeviceRecord, DeviceStatus};
use crate::device::sink::MidiSink;
use crate::error::{Error, Result};
use crate::processor::remap_channel;
use crate::types::DeviceId;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A physical interface currently attached to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub id: String,
    pub name: String,
}

/// Result of resolving a [`DeviceId`] to something sendable.
#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    pub interface: String,
    /// Channel dictated by a configured device (0-based); `None` for raw
    /// interfaces.
    pub channel_hint: Option<u8>,
    pub device_name: Option<String>,
}

pub struct DeviceDirectory {
    devices: DashMap<u32, DeviceRecord>,
    /// Attached interfaces, snapshot-swapped so reads never contend.
    interfaces: ArcSwap<Vec<InterfaceInfo>>,
    sink: Arc<dyn MidiSink>,
}

impl DeviceDirectory {
    pub fn new(sink: Arc<dyn MidiSink>) -> Self {
        Self {
            devices: DashMap::new(),
            interfaces: ArcSwap::from_pointee(Vec::new()),
            sink,
        }
    }

    // --- configured devices -------------------------------------------------

    /// Insert or replace a device record after validating it.
    pub fn upsert_device(&self, record: DeviceRecord) -> Result<()> {
        record.validate()?;
        debug!(id = record.id, name = %record.name, "device upserted");
        self.devices.insert(record.id, record);
        Ok(())
    }

    /// Remove by explicit user action. Routing entries pointing here become
    /// inert rather than dangling.
    pub fn remove_device(&self, id: u32) -> bool {
        let removed = self.devices.remove(&id).is_some();
        if removed {
            info!(id, "device removed from directory");
        }
        removed
    }

    pub fn device(&self, id: u32) -> Option<DeviceRecord> {
        self.devices.get(&id).map(|d| d.clone())
    }

    pub fn devices(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> =
            self.devices.iter().map(|d| d.value().clone()).collect();
        records.sort_unstable_by_key(|d| d.id);
        records
    }

    /// Point a device at an interface (or detach it), updating its status.
    pub fn assign_interface(&self, id: u32, interface: Option<String>) -> Result<()> {
        let mut device = self
            .devices
            .get_mut(&id)
            .ok_or(Error::DeviceNotFound(DeviceId::Configured(id)))?;
        device.status = if interface.is_some() {
            DeviceStatus::Configured
        } else {
            DeviceStatus::NotConfigured
        };
        device.assigned_interface = interface;
        Ok(())
    }

    /// Set a device's channel (1-based, as stored in the document).
    pub fn assign_channel(&self, id: u32, channel: u8) -> Result<()> {
        if channel < 1 || channel > MIDI_CHANNELS {
            return Err(Error::InvalidChannel(i32::from(channel)));
        }
        let mut device = self
            .devices
            .get_mut(&id)
            .ok_or(Error::DeviceNotFound(DeviceId::Configured(id)))?;
        device.assigned_channel = channel;
        Ok(())
    }

    /// Replace all configured devices from a persisted document.
    pub fn load_document(&self, document: &DeviceDocument) -> Result<()> {
        for device in &document.devices {
            device.validate()?;
        }
        self.devices.clear();
        for device in &document.devices {
            self.devices.insert(device.id, device.clone());
        }
        info!(count = document.devices.len(), "device document loaded");
        Ok(())
    }

    pub fn export_document(&self) -> DeviceDocument {
        DeviceDocument {
            version: DeviceDocument::CURRENT_VERSION,
            devices: self.devices(),
        }
    }

    // --- interfaces ---------------------------------------------------------

    /// Record an interface as attached.
    pub fn interface_up(&self, id: impl Into<String>, name: impl Into<String>) {
        let info = InterfaceInfo {
            id: id.into(),
            name: name.into(),
        };
        let current = self.interfaces.load();
        let mut next: Vec<InterfaceInfo> = (**current).clone();
        next.retain(|i| i.id != info.id);
        debug!(interface = %info.id, name = %info.name, "interface attached");
        next.push(info);
        self.interfaces.store(Arc::new(next));
    }

    /// Record an interface as detached. Routes through it start failing with
    /// a transient error until it returns.
    pub fn interface_down(&self, id: &str) {
        let current = self.interfaces.load();
        let mut next: Vec<InterfaceInfo> = (**current).clone();
        next.retain(|i| i.id != id);
        debug!(interface = %id, "interface detached");
        self.interfaces.store(Arc::new(next));
    }

    pub fn interfaces(&self) -> Vec<InterfaceInfo> {
        (**self.interfaces.load()).clone()
    }

    pub fn interface_attached(&self, id: &str) -> bool {
        self.interfaces.load().iter().any(|i| i.id == id)
    }

    // --- resolution + dispatch ----------------------------------------------

    /// Resolve a routing destination to a concrete interface. `None` when the
    /// device was removed or has no interface assigned.
    pub fn resolve(&self, device: &DeviceId) -> Option<ResolvedRoute> {
        match device {
            DeviceId::RawInterface(id) => Some(ResolvedRoute {
                interface: id.clone(),
                channel_hint: None,
                device_name: None,
            }),
            DeviceId::Configured(id) => {
                let record = self.devices.get(id)?;
                let interface = record.assigned_interface.clone()?;
                Some(ResolvedRoute {
                    interface,
                    channel_hint: Some(record.engine_channel()),
                    device_name: Some(record.name.clone()),
                })
            }
        }
    }

    /// True when the destination resolves to a currently attached interface.
    pub fn is_connected(&self, device: &DeviceId) -> bool {
        self.resolve(device)
            .map(|route| self.interface_attached(&route.interface))
            .unwrap_or(false)
    }

    /// Rewrite the message's channel nibble to `channel` and dispatch it.
    pub fn send_to_channel(
        &self,
        device: &DeviceId,
        bytes: &[u8],
        channel: u8,
        timestamp_ms: u64,
    ) -> Result<()> {
        if bytes.is_empty() {
            return Err(Error::Sink("empty MIDI message".to_string()));
        }
        let route = self
            .resolve(device)
            .ok_or_else(|| Error::DeviceNotFound(device.clone()))?;
        if !self.interface_attached(&route.interface) {
            return Err(Error::InterfaceUnavailable(route.interface));
        }

        let mut out: SmallVec<[u8; 3]> = SmallVec::from_slice(bytes);
        out[0] = remap_channel(out[0], channel);
        self.sink.send(&route.interface, &out, timestamp_ms)
    }

    /// All Notes Off + All Sound Off on every channel of every attached
    /// interface. Individual failures are logged, not propagated.
    pub fn panic_all(&self) {
        for interface in self.interfaces.load().iter() {
            for channel in 0..MIDI_CHANNELS {
                let all_notes_off = [0xB0 | channel, CC_ALL_NOTES_OFF, 0];
                let all_sound_off = [0xB0 | channel, CC_ALL_SOUND_OFF, 0];
                for bytes in [all_notes_off, all_sound_off] {
                    if let Err(e) = self.sink.send(&interface.id, &bytes, 0) {
                        warn!(interface = %interface.id, error = %e, "panic send failed");
                    }
                }
            }
        }
        info!("panic sent to all attached interfaces");
    }
}
