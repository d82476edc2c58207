//! Identifier types shared across the routing engine.
//!
//! `DeviceId` replaces the wire protocol's string tagging (`device:<id>` /
//! `interface:<id>`) with a discriminated type, parsed once at the boundary.

use crate::error::Error;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Track slot index within one session (0..N-1).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct TrackId(pub u16);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TrackId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u16>()
            .map(TrackId)
            .map_err(|_| Error::Parse(format!("invalid track id: {s:?}")))
    }
}

impl From<u16> for TrackId {
    fn from(v: u16) -> Self {
        TrackId(v)
    }
}

/// Opaque transport connection handle (a socket id at the boundary).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        ConnectionId(id.into())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        ConnectionId(s.to_string())
    }
}

/// Presence state of a track participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatus {
    Connected,
    Disconnected,
}

/// Destination of a routing entry.
///
/// `Configured` points into the device directory; `RawInterface` addresses a
/// MIDI interface directly, with no controller metadata or channel lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceId {
    Configured(u32),
    RawInterface(String),
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceId::Configured(id) => write!(f, "device:{id}"),
            DeviceId::RawInterface(id) => write!(f, "interface:{id}"),
        }
    }
}

impl FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(id) = s.strip_prefix("device:") {
            let id = id
                .parse::<u32>()
                .map_err(|_| Error::Parse(format!("invalid device id: {s:?}")))?;
            Ok(DeviceId::Configured(id))
        } else if let Some(id) = s.strip_prefix("interface:") {
            if id.is_empty() {
                return Err(Error::Parse("empty interface id".to_string()));
            }
            Ok(DeviceId::RawInterface(id.to_string()))
        } else {
            Err(Error::Parse(format!("unrecognized device id: {s:?}")))
        }
    }
}

impl Serialize for DeviceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
