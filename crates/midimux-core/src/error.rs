//! Error types for the routing engine.

use crate::types::{DeviceId, TrackId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("track {0} has no routing entry")]
    TrackNotFound(TrackId),

    #[error("invalid MIDI channel: {0}")]
    InvalidChannel(i32),

    #[error("invalid volume: {0}")]
    InvalidVolume(i32),

    #[error("invalid transpose: {0}")]
    InvalidTranspose(i32),

    #[error("routing enabled without a destination device")]
    EnabledWithoutDevice,

    #[error("device not found: {0}")]
    DeviceNotFound(DeviceId),

    #[error("interface not connected: {0}")]
    InterfaceUnavailable(String),

    #[error("invalid device definition: {0}")]
    InvalidDevice(String),

    #[error("MIDI send failed: {0}")]
    Sink(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
