//! Pure MIDI message transformation.
//!
//! [`process`] applies a routing entry's transpose and volume to a raw 2-3
//! byte message. It is deterministic, holds no state, never mutates its
//! input, and always returns a buffer of identical length.

use crate::config::{CC_CHANNEL_VOLUME, DEFAULT_VOLUME};
use crate::routing::RoutingEntry;
use smallvec::SmallVec;

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const CONTROL_CHANGE: u8 = 0xB0;

/// Transform `message` per `routing`.
///
/// - Note On/Off: note byte transposed (clamped to 0-127).
/// - Note On only: velocity scaled by `volume / 127`.
/// - CC7 (channel volume): value scaled the same way.
/// - Everything else passes through byte-for-byte.
pub fn process(message: &[u8], routing: &RoutingEntry) -> SmallVec<[u8; 3]> {
    let mut out: SmallVec<[u8; 3]> = SmallVec::from_slice(message);
    if out.len() < 3 {
        return out;
    }

    match out[0] & 0xF0 {
        kind @ (NOTE_ON | NOTE_OFF) => {
            if routing.transpose != 0 {
                out[1] = transpose_note(out[1], routing.transpose);
            }
            if kind == NOTE_ON && routing.volume != DEFAULT_VOLUME {
                out[2] = scale_value(out[2], routing.volume);
            }
        }
        CONTROL_CHANGE => {
            if out[1] == CC_CHANNEL_VOLUME && routing.volume != DEFAULT_VOLUME {
                out[2] = scale_value(out[2], routing.volume);
            }
        }
        _ => {}
    }

    out
}

/// Rewrite the channel nibble of a channel-message status byte; system bytes
/// (>= 0xF0) and data bytes pass through unchanged.
pub fn remap_channel(status: u8, channel: u8) -> u8 {
    if (0x80..=0xEF).contains(&status) {
        (status & 0xF0) | (channel & 0x0F)
    } else {
        status
    }
}

fn transpose_note(note: u8, semitones: i8) -> u8 {
    (i16::from(note) + i16::from(semitones)).clamp(0, 127) as u8
}

/// `round(value * volume / 127)`, clamped to 7 bits.
fn scale_value(value: u8, volume: u8) -> u8 {
    let scaled = (u32::from(value) * u32::from(volume) + 63) / 127;
    scaled.min(127) as u8
}
