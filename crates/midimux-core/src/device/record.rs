//! Configured device records and the persisted device document.
//!
//! The JSON layout is owned by the configuration UI and consumed read-only
//! here: `{version, devices:[{id, name, color, controllers, assignedInterface,
//! assignedChannel, status}]}` with camelCase keys on the wire.

use crate::config::{MAX_CONTROLLERS_PER_DEVICE, MIDI_CHANNELS, MIDI_DATA_MAX};
use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerKind {
    Continuous,
    Discrete,
}

/// One CC controller exposed by a configured device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerDef {
    pub name: String,
    pub cc_number: u8,
    #[serde(rename = "type")]
    pub kind: ControllerKind,
    /// Display range, e.g. `"0-127"` or a comma list for discrete values.
    pub range: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    NotConfigured,
    Configured,
    Active,
}

/// A user-defined device in the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub id: u32,
    pub name: String,
    /// UI feedback only; the engine never interprets it.
    pub color: String,
    pub controllers: Vec<ControllerDef>,
    /// The legacy document stores "no interface" as an empty string.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub assigned_interface: Option<String>,
    /// 1-based at this layer; the engine subtracts one before use.
    pub assigned_channel: u8,
    pub status: DeviceStatus,
}

impl DeviceRecord {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidDevice("device name is empty".to_string()));
        }
        if self.controllers.len() > MAX_CONTROLLERS_PER_DEVICE {
            return Err(Error::InvalidDevice(format!(
                "device '{}' has {} controllers (max {})",
                self.name,
                self.controllers.len(),
                MAX_CONTROLLERS_PER_DEVICE
            )));
        }
        let mut seen = HashSet::new();
        for controller in &self.controllers {
            if controller.cc_number > MIDI_DATA_MAX {
                return Err(Error::InvalidDevice(format!(
                    "controller '{}' has CC number {} out of range",
                    controller.name, controller.cc_number
                )));
            }
            if !seen.insert(controller.cc_number) {
                return Err(Error::InvalidDevice(format!(
                    "device '{}' reuses CC number {}",
                    self.name, controller.cc_number
                )));
            }
        }
        if self.assigned_channel < 1 || self.assigned_channel > MIDI_CHANNELS {
            return Err(Error::InvalidDevice(format!(
                "device '{}' channel {} out of range 1-16",
                self.name, self.assigned_channel
            )));
        }
        Ok(())
    }

    /// 0-based channel for the routing pipeline.
    pub fn engine_channel(&self) -> u8 {
        self.assigned_channel - 1
    }
}

/// Persisted device-directory document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDocument {
    pub version: u32,
    pub devices: Vec<DeviceRecord>,
}

impl DeviceDocument {
    pub const CURRENT_VERSION: u32 = 2;

    pub fn empty() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            devices: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let doc: DeviceDocument = serde_json::from_str(json)?;
        for device in &doc.devices {
            device.validate()?;
        }
        Ok(doc)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn empty_as_none<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}
