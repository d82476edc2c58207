//! Engine constants and range checks shared across the routing pipeline.

use std::time::Duration;

/// Default track slot capacity per session.
pub const MAX_TRACKS: usize = 100;

/// MIDI channels per interface (0-based in the engine, 1-based in device records).
pub const MIDI_CHANNELS: u8 = 16;

/// Maximum 7-bit MIDI data value.
pub const MIDI_DATA_MAX: u8 = 127;

/// Default per-track volume (no scaling applied).
pub const DEFAULT_VOLUME: u8 = 127;

/// Transpose limits in semitones.
pub const TRANSPOSE_MIN: i8 = -24;
pub const TRANSPOSE_MAX: i8 = 24;

/// Controllers allowed per configured device.
pub const MAX_CONTROLLERS_PER_DEVICE: usize = 4;

/// CC numbers with engine-level meaning.
pub const CC_CHANNEL_VOLUME: u8 = 7;
pub const CC_ALL_SOUND_OFF: u8 = 120;
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// Test message defaults: middle C at medium velocity, released after 500ms.
pub const TEST_NOTE: u8 = 60;
pub const TEST_VELOCITY: u8 = 64;
pub const TEST_NOTE_OFF_DELAY: Duration = Duration::from_millis(500);

/// True for a valid 0-based MIDI channel.
pub fn valid_channel(channel: u8) -> bool {
    channel < MIDI_CHANNELS
}

/// True for a valid 7-bit volume.
pub fn valid_volume(volume: u8) -> bool {
    volume <= MIDI_DATA_MAX
}

/// True for a transpose within the supported range.
pub fn valid_transpose(transpose: i8) -> bool {
    (TRANSPOSE_MIN..=TRANSPOSE_MAX).contains(&transpose)
}
