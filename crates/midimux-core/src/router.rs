//! MIDI router: validated, transformed delivery of one message from one
//! track to its configured destination, plus panic/test safety utilities.
//!
//! Nothing here propagates an error to the caller; every failure path is
//! counted (dropped or error), logged, and reported as a boolean.

use crate::config::{
    CC_ALL_NOTES_OFF, CC_ALL_SOUND_OFF, TEST_NOTE, TEST_NOTE_OFF_DELAY, TEST_VELOCITY,
};
use crate::device::DeviceDirectory;
use crate::processor;
use crate::routing::{RoutingEntry, RoutingMatrix};
use crate::scheduler::{Scheduler, TaskHandle, ThreadScheduler};
use crate::types::{TrackId, TrackStatus};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace, warn};

/// Structural well-formedness check for a raw MIDI message.
///
/// System messages (status >= 0xF0) are always accepted; channel messages
/// must carry the data bytes their type requires.
pub fn validate_message(message: &[u8]) -> bool {
    let Some(&status) = message.first() else {
        return false;
    };
    if status >= 0xF0 {
        return true;
    }
    if status < 0x80 {
        return false;
    }
    match status & 0xF0 {
        // Note Off/On, Aftertouch, Control Change, Pitch Bend
        0x80 | 0x90 | 0xA0 | 0xB0 | 0xE0 => message.len() >= 3,
        // Program Change, Channel Pressure
        0xC0 | 0xD0 => message.len() >= 2,
        _ => false,
    }
}

/// Routing counters; monotonic until [`MidiRouter::reset_stats`].
#[derive(Debug, Clone, Serialize)]
pub struct RouterStats {
    pub messages_routed: u64,
    pub messages_dropped: u64,
    pub routing_errors: u64,
    pub active_routes: usize,
    pub connected_interfaces: usize,
}

/// Debug listing of one track's routing state.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingInfo {
    pub track: TrackId,
    pub initials: String,
    pub status: TrackStatus,
    pub routing: Option<RoutingEntry>,
    pub device_available: bool,
    pub device_name: Option<String>,
}

pub struct MidiRouter {
    matrix: Arc<RoutingMatrix>,
    directory: Arc<DeviceDirectory>,
    scheduler: Arc<dyn Scheduler>,
    messages_routed: AtomicU64,
    messages_dropped: AtomicU64,
    routing_errors: AtomicU64,
    /// Outstanding test-message Note-Offs, cancelled on track teardown.
    pending_note_offs: DashMap<TrackId, Vec<TaskHandle>>,
    /// Self-reference handed to scheduled jobs.
    weak_self: Weak<MidiRouter>,
}

impl MidiRouter {
    pub fn new(matrix: Arc<RoutingMatrix>, directory: Arc<DeviceDirectory>) -> Arc<Self> {
        Self::with_scheduler(matrix, directory, Arc::new(ThreadScheduler))
    }

    pub fn with_scheduler(
        matrix: Arc<RoutingMatrix>,
        directory: Arc<DeviceDirectory>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            matrix,
            directory,
            scheduler,
            messages_routed: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            routing_errors: AtomicU64::new(0),
            pending_note_offs: DashMap::new(),
            weak_self: weak_self.clone(),
        })
    }

    pub fn matrix(&self) -> &Arc<RoutingMatrix> {
        &self.matrix
    }

    pub fn directory(&self) -> &Arc<DeviceDirectory> {
        &self.directory
    }

    /// Route one raw message from `track` to its configured destination:
    /// presence and routing checks, transform, channel remap, dispatch.
    pub fn route_message(&self, track: TrackId, message: &[u8], timestamp_ms: u64) -> bool {
        let Some(presence) = self.matrix.get_track(track) else {
            warn!(%track, "cannot route: track not in matrix");
            self.messages_dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };
        if presence.status != TrackStatus::Connected {
            warn!(%track, "cannot route: track not connected");
            self.messages_dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let routing = self.matrix.get_routing(track);
        let Some(routing) = routing.filter(|r| r.enabled) else {
            debug!(%track, "message not routed: no destination configured");
            self.messages_dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };
        let Some(device) = routing.device.clone() else {
            debug!(%track, "message not routed: no destination configured");
            self.messages_dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        if !self.directory.is_connected(&device) {
            warn!(%track, %device, "cannot route: device not available");
            self.routing_errors.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let processed = processor::process(message, &routing);
        match self
            .directory
            .send_to_channel(&device, &processed, routing.channel, timestamp_ms)
        {
            Ok(()) => {
                trace!(%track, %device, channel = routing.channel + 1, "message routed");
                self.messages_routed.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                warn!(%track, %device, error = %e, "routing dispatch failed");
                self.routing_errors.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Route a batch from one track; returns how many succeeded.
    pub fn route_messages(&self, track: TrackId, batch: &[(Vec<u8>, u64)]) -> usize {
        batch
            .iter()
            .filter(|(message, timestamp_ms)| self.route_message(track, message, *timestamp_ms))
            .count()
    }

    /// Send a Note-On through the normal pipeline and schedule the matching
    /// Note-Off 500ms later. The deferred Note-Off is cancelled by
    /// [`MidiRouter::handle_track_disconnect`]; if the device disappears in
    /// the interim its send simply fails and is counted.
    pub fn send_test_message(&self, track: TrackId, note: u8, velocity: u8) -> bool {
        let note = note & 0x7F;
        let note_on = [0x90, note, velocity & 0x7F];
        if !self.route_message(track, &note_on, now_ms()) {
            return false;
        }

        let router = self.weak_self.clone();
        let handle = self.scheduler.schedule(
            TEST_NOTE_OFF_DELAY,
            Box::new(move || {
                if let Some(router) = router.upgrade() {
                    router.route_message(track, &[0x80, note, 0], now_ms());
                }
            }),
        );

        let mut pending = self.pending_note_offs.entry(track).or_default();
        pending.retain(|h| !h.is_done());
        pending.push(handle);
        true
    }

    /// [`send_test_message`](Self::send_test_message) with middle C at
    /// medium velocity.
    pub fn send_default_test_message(&self, track: TrackId) -> bool {
        self.send_test_message(track, TEST_NOTE, TEST_VELOCITY)
    }

    /// Silence a track's device: CC123 (All Notes Off) then CC120 (All Sound
    /// Off) on the routed channel. Panic deliberately bypasses the message
    /// processor - a transposed or scaled panic could miss sounding notes.
    /// Returns whether the device was reachable.
    pub fn send_track_panic(&self, track: TrackId) -> bool {
        let Some(routing) = self.matrix.get_routing(track) else {
            return false;
        };
        let Some(device) = routing.device.clone() else {
            return false;
        };
        if !self.directory.is_connected(&device) {
            return false;
        }

        let channel = routing.channel;
        let all_notes_off = [0xB0 | channel, CC_ALL_NOTES_OFF, 0];
        let all_sound_off = [0xB0 | channel, CC_ALL_SOUND_OFF, 0];
        let mut ok = true;
        for bytes in [all_notes_off, all_sound_off] {
            if let Err(e) = self
                .directory
                .send_to_channel(&device, &bytes, channel, now_ms())
            {
                warn!(%track, error = %e, "panic send failed");
                ok = false;
            }
        }
        debug!(%track, channel = channel + 1, "panic sent");
        ok
    }

    /// Panic every known track; returns how many devices were reachable.
    pub fn send_all_tracks_panic(&self) -> usize {
        let count = self
            .matrix
            .all_tracks()
            .into_iter()
            .filter(|(track, _)| self.send_track_panic(*track))
            .count();
        debug!(count, "panic sent to all tracks");
        count
    }

    /// Teardown hook: cancel any scheduled Note-Offs for the track, then
    /// silence its device.
    pub fn handle_track_disconnect(&self, track: TrackId) {
        self.cancel_pending_note_offs(track);
        self.send_track_panic(track);
    }

    pub fn cancel_pending_note_offs(&self, track: TrackId) {
        if let Some((_, handles)) = self.pending_note_offs.remove(&track) {
            for handle in handles {
                handle.cancel();
            }
        }
    }

    pub fn stats(&self) -> RouterStats {
        let active_routes = self
            .matrix
            .all_routings()
            .iter()
            .filter(|(_, r)| r.is_routed())
            .count();
        RouterStats {
            messages_routed: self.messages_routed.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            routing_errors: self.routing_errors.load(Ordering::Relaxed),
            active_routes,
            connected_interfaces: self.directory.interfaces().len(),
        }
    }

    /// Counters reset only here, never automatically.
    pub fn reset_stats(&self) {
        self.messages_routed.store(0, Ordering::Relaxed);
        self.messages_dropped.store(0, Ordering::Relaxed);
        self.routing_errors.store(0, Ordering::Relaxed);
    }

    /// Per-track routing details for diagnostics.
    pub fn routing_info(&self) -> Vec<RoutingInfo> {
        self.matrix
            .all_tracks()
            .into_iter()
            .map(|(track, presence)| {
                let routing = self.matrix.get_routing(track);
                let resolved = routing
                    .as_ref()
                    .and_then(|r| r.device.as_ref())
                    .and_then(|d| self.directory.resolve(d));
                let device_available = routing
                    .as_ref()
                    .and_then(|r| r.device.as_ref())
                    .map(|d| self.directory.is_connected(d))
                    .unwrap_or(false);
                RoutingInfo {
                    track,
                    initials: presence.initials,
                    status: presence.status,
                    routing,
                    device_available,
                    device_name: resolved.and_then(|r| r.device_name),
                }
            })
            .collect()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MemorySink, MidiSink};
    use crate::routing::RoutingUpdate;
    use crate::scheduler::ManualScheduler;
    use crate::types::{ConnectionId, DeviceId};

    struct Rig {
        sink: Arc<MemorySink>,
        matrix: Arc<RoutingMatrix>,
        directory: Arc<DeviceDirectory>,
        scheduler: Arc<ManualScheduler>,
        router: Arc<MidiRouter>,
    }

    /// Track 0 routed to interface "X" (attached) on channel 3, enabled.
    fn rig() -> Rig {
        let sink = Arc::new(MemorySink::new());
        let matrix = Arc::new(RoutingMatrix::new());
        let directory = Arc::new(DeviceDirectory::new(sink.clone() as Arc<dyn MidiSink>));
        let scheduler = Arc::new(ManualScheduler::new());
        let router = MidiRouter::with_scheduler(matrix.clone(), directory.clone(), scheduler.clone());

        directory.interface_up("X", "USB MIDI X");
        matrix.add_track(TrackId(0), ConnectionId::from("sock1"), "AB");
        matrix
            .update_routing(
                TrackId(0),
                &RoutingUpdate::new()
                    .device(Some(DeviceId::RawInterface("X".into())))
                    .channel(3)
                    .enabled(true),
            )
            .unwrap();

        Rig {
            sink,
            matrix,
            directory,
            scheduler,
            router,
        }
    }

    #[test]
    fn test_routed_message_is_remapped_and_counted() {
        let rig = rig();
        assert!(rig.router.route_message(TrackId(0), &[0x90, 60, 100], 7));

        let sent = rig.sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].bytes, vec![0x93, 60, 100]);
        assert_eq!(rig.router.stats().messages_routed, 1);
    }

    #[test]
    fn test_volume_scaling_through_pipeline() {
        let rig = rig();
        rig.matrix
            .update_routing(TrackId(0), &RoutingUpdate::new().volume(64))
            .unwrap();

        assert!(rig.router.route_message(TrackId(0), &[0x90, 60, 100], 0));
        assert_eq!(rig.sink.sent()[0].bytes, vec![0x93, 60, 50]);
    }

    #[test]
    fn test_disabled_route_drops() {
        let rig = rig();
        rig.matrix.set_track_enabled(TrackId(0), false).unwrap();

        assert!(!rig.router.route_message(TrackId(0), &[0x90, 60, 100], 0));
        assert!(rig.sink.sent().is_empty());
        let stats = rig.router.stats();
        assert_eq!(stats.messages_dropped, 1);
        assert_eq!(stats.messages_routed, 0);
    }

    #[test]
    fn test_unknown_and_disconnected_tracks_drop() {
        let rig = rig();
        assert!(!rig.router.route_message(TrackId(5), &[0x90, 60, 100], 0));

        rig.matrix
            .update_track_status(TrackId(0), TrackStatus::Disconnected);
        assert!(!rig.router.route_message(TrackId(0), &[0x90, 60, 100], 0));

        assert_eq!(rig.router.stats().messages_dropped, 2);
    }

    #[test]
    fn test_detached_interface_counts_error() {
        let rig = rig();
        rig.directory.interface_down("X");

        assert!(!rig.router.route_message(TrackId(0), &[0x90, 60, 100], 0));
        let stats = rig.router.stats();
        assert_eq!(stats.routing_errors, 1);
        assert_eq!(stats.messages_dropped, 0);
    }

    #[test]
    fn test_sink_failure_counts_error() {
        let rig = rig();
        rig.sink.set_failing(true);

        assert!(!rig.router.route_message(TrackId(0), &[0x90, 60, 100], 0));
        assert_eq!(rig.router.stats().routing_errors, 1);
    }

    #[test]
    fn test_batch_routing_counts_successes() {
        let rig = rig();
        let batch = vec![
            (vec![0x90, 60, 100], 1),
            (vec![0x80, 60, 0], 2),
        ];
        assert_eq!(rig.router.route_messages(TrackId(0), &batch), 2);
        assert_eq!(rig.sink.sent().len(), 2);
    }

    #[test]
    fn test_test_message_schedules_note_off() {
        let rig = rig();
        assert!(rig.router.send_test_message(TrackId(0), 60, 64));
        assert_eq!(rig.sink.sent().len(), 1);
        assert_eq!(rig.sink.sent()[0].bytes, vec![0x93, 60, 64]);
        assert_eq!(rig.scheduler.pending_count(), 1);

        assert_eq!(rig.scheduler.run_pending(), 1);
        let sent = rig.sink.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].bytes, vec![0x83, 60, 0]);
    }

    #[test]
    fn test_note_off_skipped_after_disconnect() {
        let rig = rig();
        assert!(rig.router.send_test_message(TrackId(0), 60, 64));

        rig.router.handle_track_disconnect(TrackId(0));
        // Disconnect already sent the panic pair; the scheduled Note-Off must
        // not fire on top of it.
        let sent_before = rig.sink.sent().len();
        assert_eq!(rig.scheduler.run_pending(), 0);
        assert_eq!(rig.sink.sent().len(), sent_before);
    }

    #[test]
    fn test_test_message_not_scheduled_when_route_fails() {
        let rig = rig();
        rig.matrix.set_track_enabled(TrackId(0), false).unwrap();
        assert!(!rig.router.send_test_message(TrackId(0), 60, 64));
        assert_eq!(rig.scheduler.pending_count(), 0);
    }

    #[test]
    fn test_panic_bypasses_processor() {
        let rig = rig();
        // Transpose and volume must not touch panic messages.
        rig.matrix
            .update_routing(TrackId(0), &RoutingUpdate::new().transpose(12).volume(1))
            .unwrap();

        assert!(rig.router.send_track_panic(TrackId(0)));
        let sent = rig.sink.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].bytes, vec![0xB3, 123, 0]);
        assert_eq!(sent[1].bytes, vec![0xB3, 120, 0]);
    }

    #[test]
    fn test_panic_works_on_disabled_route() {
        // Panic only needs a device, not an enabled route.
        let rig = rig();
        rig.matrix.set_track_enabled(TrackId(0), false).unwrap();
        assert!(rig.router.send_track_panic(TrackId(0)));
    }

    #[test]
    fn test_panic_unreachable_device() {
        let rig = rig();
        rig.directory.interface_down("X");
        assert!(!rig.router.send_track_panic(TrackId(0)));
        assert!(rig.sink.sent().is_empty());
    }

    #[test]
    fn test_all_tracks_panic_counts_reachable() {
        let rig = rig();
        // Second track with no device: unreachable.
        rig.matrix.add_track(TrackId(1), ConnectionId::from("s2"), "CD");
        assert_eq!(rig.router.send_all_tracks_panic(), 1);
    }

    #[test]
    fn test_validate_message_table() {
        // System messages always valid.
        assert!(validate_message(&[0xF8]));
        assert!(validate_message(&[0xF0, 0x01]));
        // Three-byte channel messages.
        assert!(validate_message(&[0x90, 60, 100]));
        assert!(validate_message(&[0x80, 60, 0]));
        assert!(validate_message(&[0xA0, 60, 10]));
        assert!(validate_message(&[0xB0, 7, 127]));
        assert!(validate_message(&[0xE0, 0, 64]));
        assert!(!validate_message(&[0x90, 60]));
        assert!(!validate_message(&[0xB0]));
        // Two-byte channel messages.
        assert!(validate_message(&[0xC0, 12]));
        assert!(validate_message(&[0xD0, 40]));
        assert!(!validate_message(&[0xC0]));
        // Garbage.
        assert!(!validate_message(&[]));
        assert!(!validate_message(&[0x40, 60, 100]));
    }

    #[test]
    fn test_reset_stats() {
        let rig = rig();
        rig.router.route_message(TrackId(0), &[0x90, 60, 100], 0);
        rig.router.route_message(TrackId(9), &[0x90, 60, 100], 0);
        assert_eq!(rig.router.stats().messages_routed, 1);

        rig.router.reset_stats();
        let stats = rig.router.stats();
        assert_eq!(stats.messages_routed, 0);
        assert_eq!(stats.messages_dropped, 0);
        assert_eq!(stats.routing_errors, 0);
    }

    #[test]
    fn test_routing_info_lists_tracks() {
        let rig = rig();
        let info = rig.router.routing_info();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].initials, "AB");
        assert!(info[0].device_available);
    }
}
