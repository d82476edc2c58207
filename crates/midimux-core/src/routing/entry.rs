//! Per-track routing configuration and presence records.

use crate::config;
use crate::error::{Error, Result};
use crate::types::{ConnectionId, DeviceId, TrackStatus};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Where and how one track's MIDI messages are delivered.
///
/// Created with defaults the moment a track slot first appears and retained
/// across track disconnects so a reconnecting participant resumes routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingEntry {
    /// Destination; `None` until the sequencer assigns one.
    pub device: Option<DeviceId>,
    /// 0-based MIDI channel the message is remapped to.
    pub channel: u8,
    pub enabled: bool,
    /// True when the channel is dictated by a configured device.
    pub channel_locked: bool,
    /// 0-127; scales Note-On velocity and CC7 values.
    pub volume: u8,
    /// Semitones, -24..=24.
    pub transpose: i8,
}

impl Default for RoutingEntry {
    fn default() -> Self {
        Self {
            device: None,
            channel: 0,
            enabled: false,
            channel_locked: false,
            volume: config::DEFAULT_VOLUME,
            transpose: 0,
        }
    }
}

impl RoutingEntry {
    pub fn validate(&self) -> Result<()> {
        if !config::valid_channel(self.channel) {
            return Err(Error::InvalidChannel(i32::from(self.channel)));
        }
        if !config::valid_volume(self.volume) {
            return Err(Error::InvalidVolume(i32::from(self.volume)));
        }
        if !config::valid_transpose(self.transpose) {
            return Err(Error::InvalidTranspose(i32::from(self.transpose)));
        }
        if self.enabled && self.device.is_none() {
            return Err(Error::EnabledWithoutDevice);
        }
        Ok(())
    }

    /// True when messages for this entry can actually go somewhere.
    pub fn is_routed(&self) -> bool {
        self.enabled && self.device.is_some()
    }
}

/// Partial update merged into an existing [`RoutingEntry`].
///
/// Unset fields keep their current value; `device` distinguishes "leave as
/// is" (unset) from "clear the destination" (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct RoutingUpdate {
    device: Option<Option<DeviceId>>,
    channel: Option<u8>,
    enabled: Option<bool>,
    channel_locked: Option<bool>,
    volume: Option<u8>,
    transpose: Option<i8>,
}

impl RoutingUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(mut self, device: Option<DeviceId>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn channel(mut self, channel: u8) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn channel_locked(mut self, locked: bool) -> Self {
        self.channel_locked = Some(locked);
        self
    }

    pub fn volume(mut self, volume: u8) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn transpose(mut self, transpose: i8) -> Self {
        self.transpose = Some(transpose);
        self
    }

    /// Merge into `current`, leaving unset fields untouched.
    pub fn apply(&self, current: &RoutingEntry) -> RoutingEntry {
        RoutingEntry {
            device: self
                .device
                .clone()
                .unwrap_or_else(|| current.device.clone()),
            channel: self.channel.unwrap_or(current.channel),
            enabled: self.enabled.unwrap_or(current.enabled),
            channel_locked: self.channel_locked.unwrap_or(current.channel_locked),
            volume: self.volume.unwrap_or(current.volume),
            transpose: self.transpose.unwrap_or(current.transpose),
        }
    }
}

/// Presence record for an occupied track slot.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackPresence {
    pub connection: ConnectionId,
    pub initials: String,
    pub status: TrackStatus,
    pub last_activity: Instant,
}

impl TrackPresence {
    pub fn new(connection: ConnectionId, initials: impl Into<String>) -> Self {
        Self {
            connection,
            initials: initials.into(),
            status: TrackStatus::Connected,
            last_activity: Instant::now(),
        }
    }
}
