//! Routing matrix: single source of truth for track presence and routing
//! configuration within one session.
//!
//! All methods take `&self`; keyed state lives in `DashMap` shards so the
//! event-loop caller never holds an explicit lock. Routing entries survive
//! track disconnects (a reconnecting track resumes its prior routing) and are
//! only discarded by [`RoutingMatrix::clear`].

use crate::config;
use crate::error::{Error, Result};
use crate::events::{EventBus, Subscription};
use crate::routing::entry::{RoutingEntry, RoutingUpdate, TrackPresence};
use crate::types::{ConnectionId, DeviceId, TrackId, TrackStatus};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// What happened to a track's presence record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackChangeAction {
    Added,
    Removed,
    Updated,
}

#[derive(Debug, Clone)]
pub struct TrackChange {
    pub action: TrackChangeAction,
    pub track: TrackId,
    pub presence: TrackPresence,
}

#[derive(Debug, Clone)]
pub struct RoutingChanged {
    pub track: TrackId,
    pub entry: RoutingEntry,
}

/// One display-ready row of the routing matrix.
#[derive(Debug, Clone, Serialize)]
pub struct MatrixRow {
    pub track: TrackId,
    /// 1-based for display.
    pub track_number: u32,
    pub connection: ConnectionId,
    pub initials: String,
    pub status: TrackStatus,
    pub device: Option<DeviceId>,
    pub channel: u8,
    pub channel_locked: bool,
    pub enabled: bool,
    pub volume: u8,
    pub transpose: i8,
    /// Milliseconds since the track's last activity.
    pub idle_ms: u64,
}

/// Aggregate counts over the matrix.
#[derive(Debug, Clone, Serialize)]
pub struct MatrixStats {
    pub total_tracks: usize,
    pub active_tracks: usize,
    pub routed_tracks: usize,
    pub device_usage: HashMap<DeviceId, usize>,
}

pub struct RoutingMatrix {
    routings: DashMap<TrackId, RoutingEntry>,
    tracks: DashMap<TrackId, TrackPresence>,
    track_events: EventBus<TrackChange>,
    routing_events: EventBus<RoutingChanged>,
}

impl RoutingMatrix {
    pub fn new() -> Self {
        Self {
            routings: DashMap::new(),
            tracks: DashMap::new(),
            track_events: EventBus::new(),
            routing_events: EventBus::new(),
        }
    }

    /// Observe presence changes (add/remove/status updates).
    pub fn subscribe_track_changes(&self) -> Subscription<TrackChange> {
        self.track_events.subscribe()
    }

    /// Observe successful routing updates (full merged entries).
    pub fn subscribe_routing_changes(&self) -> Subscription<RoutingChanged> {
        self.routing_events.subscribe()
    }

    /// Upsert presence for `track`; creates the default routing entry on
    /// first sight of this slot.
    pub fn add_track(
        &self,
        track: TrackId,
        connection: ConnectionId,
        initials: impl Into<String>,
    ) {
        let presence = TrackPresence::new(connection, initials);
        self.tracks.insert(track, presence.clone());
        self.routings.entry(track).or_default();

        debug!(%track, initials = %presence.initials, "track added to routing matrix");
        self.track_events.publish(&TrackChange {
            action: TrackChangeAction::Added,
            track,
            presence,
        });
    }

    /// Delete presence only; the routing entry is retained for reconnects.
    /// No-op (and no notification) when the track is not present.
    pub fn remove_track(&self, track: TrackId) {
        if let Some((_, presence)) = self.tracks.remove(&track) {
            debug!(%track, "track removed from routing matrix");
            self.track_events.publish(&TrackChange {
                action: TrackChangeAction::Removed,
                track,
                presence,
            });
        }
    }

    /// Merge `update` into the track's routing entry.
    ///
    /// Fails without any partial write when the track has no entry or the
    /// merged values are out of range; on success the full merged entry is
    /// published and returned.
    pub fn update_routing(&self, track: TrackId, update: &RoutingUpdate) -> Result<RoutingEntry> {
        let merged = {
            let mut entry = self
                .routings
                .get_mut(&track)
                .ok_or(Error::TrackNotFound(track))?;
            let merged = update.apply(&entry);
            if let Err(e) = merged.validate() {
                warn!(%track, error = %e, "routing update rejected");
                return Err(e);
            }
            *entry = merged.clone();
            merged
        };

        debug!(%track, entry = ?merged, "routing updated");
        self.routing_events.publish(&RoutingChanged {
            track,
            entry: merged.clone(),
        });
        Ok(merged)
    }

    /// Convenience wrapper toggling only the `enabled` flag.
    pub fn set_track_enabled(&self, track: TrackId, enabled: bool) -> Result<RoutingEntry> {
        self.update_routing(track, &RoutingUpdate::new().enabled(enabled))
    }

    pub fn get_routing(&self, track: TrackId) -> Option<RoutingEntry> {
        self.routings.get(&track).map(|e| e.clone())
    }

    pub fn get_track(&self, track: TrackId) -> Option<TrackPresence> {
        self.tracks.get(&track).map(|t| t.clone())
    }

    /// Flip a present track's status and refresh its activity timestamp.
    pub fn update_track_status(&self, track: TrackId, status: TrackStatus) {
        let updated = self.tracks.get_mut(&track).map(|mut presence| {
            presence.status = status;
            presence.last_activity = std::time::Instant::now();
            presence.clone()
        });
        if let Some(presence) = updated {
            self.track_events.publish(&TrackChange {
                action: TrackChangeAction::Updated,
                track,
                presence,
            });
        }
    }

    /// First track occupied by `connection`, if any. A connection occupies at
    /// most one slot, so "first" is also "only".
    pub fn find_track_by_connection(&self, connection: &ConnectionId) -> Option<TrackId> {
        self.tracks
            .iter()
            .find(|entry| &entry.value().connection == connection)
            .map(|entry| *entry.key())
    }

    /// Tracks with an enabled route to `device`, ascending.
    pub fn tracks_for_device(&self, device: &DeviceId) -> Vec<TrackId> {
        let mut tracks: Vec<TrackId> = self
            .routings
            .iter()
            .filter(|e| e.value().enabled && e.value().device.as_ref() == Some(device))
            .map(|e| *e.key())
            .collect();
        tracks.sort_unstable();
        tracks
    }

    /// Tracks with an enabled route to the exact (device, channel) pair.
    pub fn tracks_for_device_channel(&self, device: &DeviceId, channel: u8) -> Vec<TrackId> {
        let mut tracks: Vec<TrackId> = self
            .routings
            .iter()
            .filter(|e| {
                let r = e.value();
                r.enabled && r.channel == channel && r.device.as_ref() == Some(device)
            })
            .map(|e| *e.key())
            .collect();
        tracks.sort_unstable();
        tracks
    }

    /// True iff no *other* enabled routing entry occupies (device, channel).
    pub fn is_device_channel_available(
        &self,
        device: &DeviceId,
        channel: u8,
        exclude: Option<TrackId>,
    ) -> bool {
        !self.routings.iter().any(|e| {
            if exclude == Some(*e.key()) {
                return false;
            }
            let r = e.value();
            r.enabled && r.channel == channel && r.device.as_ref() == Some(device)
        })
    }

    /// Lowest free channel 0..16 for `device`, or `None` when all are taken.
    pub fn next_available_channel(&self, device: &DeviceId) -> Option<u8> {
        (0..config::MIDI_CHANNELS)
            .find(|&channel| self.is_device_channel_available(device, channel, None))
    }

    /// Snapshot of every present track's routing entry.
    pub fn all_routings(&self) -> Vec<(TrackId, RoutingEntry)> {
        let mut routings: Vec<(TrackId, RoutingEntry)> = self
            .routings
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        routings.sort_unstable_by_key(|(track, _)| *track);
        routings
    }

    pub fn all_tracks(&self) -> Vec<(TrackId, TrackPresence)> {
        let mut tracks: Vec<(TrackId, TrackPresence)> = self
            .tracks
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        tracks.sort_unstable_by_key(|(track, _)| *track);
        tracks
    }

    /// Display-ready snapshot ordered by ascending track id. Tracks without a
    /// presence record are omitted even if they still hold a routing entry.
    pub fn matrix_data(&self) -> Vec<MatrixRow> {
        let mut rows: Vec<MatrixRow> = self
            .tracks
            .iter()
            .map(|entry| {
                let track = *entry.key();
                let presence = entry.value();
                let routing = self.get_routing(track).unwrap_or_default();
                MatrixRow {
                    track,
                    track_number: u32::from(track.0) + 1,
                    connection: presence.connection.clone(),
                    initials: presence.initials.clone(),
                    status: presence.status,
                    device: routing.device,
                    channel: routing.channel,
                    channel_locked: routing.channel_locked,
                    enabled: routing.enabled,
                    volume: routing.volume,
                    transpose: routing.transpose,
                    idle_ms: presence.last_activity.elapsed().as_millis() as u64,
                }
            })
            .collect();
        rows.sort_unstable_by_key(|row| row.track);
        rows
    }

    pub fn stats(&self) -> MatrixStats {
        let total_tracks = self.tracks.len();
        let active_tracks = self
            .tracks
            .iter()
            .filter(|e| e.value().status == TrackStatus::Connected)
            .count();

        let mut routed_tracks = 0;
        let mut device_usage: HashMap<DeviceId, usize> = HashMap::new();
        for entry in self.routings.iter() {
            let r = entry.value();
            if let (true, Some(device)) = (r.enabled, r.device.as_ref()) {
                routed_tracks += 1;
                *device_usage.entry(device.clone()).or_insert(0) += 1;
            }
        }

        MatrixStats {
            total_tracks,
            active_tracks,
            routed_tracks,
            device_usage,
        }
    }

    /// Drop all presence and routing state (whole-session teardown).
    pub fn clear(&self) {
        self.routings.clear();
        self.tracks.clear();
        debug!("routing matrix cleared");
    }
}

impl Default for RoutingMatrix {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix_with_track(track: TrackId) -> RoutingMatrix {
        let matrix = RoutingMatrix::new();
        matrix.add_track(track, ConnectionId::from("sock1"), "AB");
        matrix
    }

    #[test]
    fn test_add_track_creates_default_routing() {
        let matrix = matrix_with_track(TrackId(0));
        let routing = matrix.get_routing(TrackId(0)).unwrap();
        assert_eq!(routing, RoutingEntry::default());

        let presence = matrix.get_track(TrackId(0)).unwrap();
        assert_eq!(presence.initials, "AB");
        assert_eq!(presence.status, TrackStatus::Connected);
    }

    #[test]
    fn test_routing_survives_reconnect() {
        let matrix = matrix_with_track(TrackId(3));
        matrix
            .update_routing(
                TrackId(3),
                &RoutingUpdate::new()
                    .device(Some(DeviceId::RawInterface("X".into())))
                    .channel(5)
                    .enabled(true),
            )
            .unwrap();

        matrix.remove_track(TrackId(3));
        assert!(matrix.get_track(TrackId(3)).is_none());

        matrix.add_track(TrackId(3), ConnectionId::from("sock2"), "CD");
        let routing = matrix.get_routing(TrackId(3)).unwrap();
        assert_eq!(routing.channel, 5);
        assert!(routing.enabled);
        assert_eq!(routing.device, Some(DeviceId::RawInterface("X".into())));
    }

    #[test]
    fn test_update_unknown_track_fails() {
        let matrix = RoutingMatrix::new();
        let err = matrix
            .update_routing(TrackId(9), &RoutingUpdate::new().channel(1))
            .unwrap_err();
        assert!(matches!(err, Error::TrackNotFound(TrackId(9))));
        // Failure must not create an entry.
        assert!(matrix.get_routing(TrackId(9)).is_none());
    }

    #[test]
    fn test_invalid_update_leaves_entry_unchanged() {
        let matrix = matrix_with_track(TrackId(0));
        let before = matrix.get_routing(TrackId(0)).unwrap();

        assert!(matrix
            .update_routing(TrackId(0), &RoutingUpdate::new().channel(16))
            .is_err());
        assert!(matrix
            .update_routing(TrackId(0), &RoutingUpdate::new().volume(128))
            .is_err());
        assert!(matrix
            .update_routing(TrackId(0), &RoutingUpdate::new().transpose(25))
            .is_err());
        assert!(matrix
            .update_routing(TrackId(0), &RoutingUpdate::new().enabled(true))
            .is_err());

        assert_eq!(matrix.get_routing(TrackId(0)).unwrap(), before);
    }

    #[test]
    fn test_remove_absent_track_is_silent() {
        let matrix = RoutingMatrix::new();
        let changes = matrix.subscribe_track_changes();
        matrix.remove_track(TrackId(7));
        assert!(changes.try_recv().is_none());
    }

    #[test]
    fn test_find_track_by_connection() {
        let matrix = RoutingMatrix::new();
        matrix.add_track(TrackId(0), ConnectionId::from("a"), "AA");
        matrix.add_track(TrackId(1), ConnectionId::from("b"), "BB");

        assert_eq!(
            matrix.find_track_by_connection(&ConnectionId::from("b")),
            Some(TrackId(1))
        );
        assert_eq!(matrix.find_track_by_connection(&ConnectionId::from("z")), None);
    }

    #[test]
    fn test_channel_availability_and_next_free() {
        let matrix = RoutingMatrix::new();
        let device = DeviceId::RawInterface("X".into());

        for i in 0..3u16 {
            matrix.add_track(TrackId(i), ConnectionId::from(format!("s{i}").as_str()), "T");
            matrix
                .update_routing(
                    TrackId(i),
                    &RoutingUpdate::new()
                        .device(Some(device.clone()))
                        .channel(i as u8)
                        .enabled(true),
                )
                .unwrap();
        }

        assert!(!matrix.is_device_channel_available(&device, 0, None));
        assert!(matrix.is_device_channel_available(&device, 0, Some(TrackId(0))));
        assert!(matrix.is_device_channel_available(&device, 3, None));
        assert_eq!(matrix.next_available_channel(&device), Some(3));
    }

    #[test]
    fn test_next_available_channel_exhausted() {
        let matrix = RoutingMatrix::new();
        let device = DeviceId::RawInterface("X".into());

        for i in 0..16u16 {
            matrix.add_track(TrackId(i), ConnectionId::from(format!("s{i}").as_str()), "T");
            matrix
                .update_routing(
                    TrackId(i),
                    &RoutingUpdate::new()
                        .device(Some(device.clone()))
                        .channel(i as u8)
                        .enabled(true),
                )
                .unwrap();
        }

        assert_eq!(matrix.next_available_channel(&device), None);
    }

    #[test]
    fn test_disabled_routes_do_not_occupy_channels() {
        let matrix = matrix_with_track(TrackId(0));
        let device = DeviceId::RawInterface("X".into());
        matrix
            .update_routing(
                TrackId(0),
                &RoutingUpdate::new().device(Some(device.clone())).channel(0),
            )
            .unwrap();

        assert!(matrix.is_device_channel_available(&device, 0, None));
        assert!(matrix.tracks_for_device(&device).is_empty());
    }

    #[test]
    fn test_matrix_data_sorted_and_presence_only() {
        let matrix = RoutingMatrix::new();
        matrix.add_track(TrackId(5), ConnectionId::from("c"), "CC");
        matrix.add_track(TrackId(1), ConnectionId::from("a"), "AA");
        // Routing entry without presence must be omitted.
        matrix.add_track(TrackId(9), ConnectionId::from("z"), "ZZ");
        matrix.remove_track(TrackId(9));

        let rows = matrix.matrix_data();
        let ids: Vec<u16> = rows.iter().map(|r| r.track.0).collect();
        assert_eq!(ids, vec![1, 5]);
        assert_eq!(rows[0].track_number, 2);
    }

    #[test]
    fn test_observers_see_changes() {
        let matrix = RoutingMatrix::new();
        let track_changes = matrix.subscribe_track_changes();
        let routing_changes = matrix.subscribe_routing_changes();

        matrix.add_track(TrackId(0), ConnectionId::from("s"), "AB");
        matrix
            .update_routing(
                TrackId(0),
                &RoutingUpdate::new()
                    .device(Some(DeviceId::Configured(1)))
                    .enabled(true),
            )
            .unwrap();
        matrix.remove_track(TrackId(0));

        let actions: Vec<TrackChangeAction> =
            track_changes.drain().iter().map(|c| c.action).collect();
        assert_eq!(
            actions,
            vec![TrackChangeAction::Added, TrackChangeAction::Removed]
        );

        let changed = routing_changes.drain();
        assert_eq!(changed.len(), 1);
        assert!(changed[0].entry.enabled);
    }

    #[test]
    fn test_stats_counts() {
        let matrix = RoutingMatrix::new();
        let device = DeviceId::Configured(1);
        for i in 0..2u16 {
            matrix.add_track(TrackId(i), ConnectionId::from(format!("s{i}").as_str()), "T");
        }
        matrix
            .update_routing(
                TrackId(0),
                &RoutingUpdate::new().device(Some(device.clone())).enabled(true),
            )
            .unwrap();
        matrix.update_track_status(TrackId(1), TrackStatus::Disconnected);

        let stats = matrix.stats();
        assert_eq!(stats.total_tracks, 2);
        assert_eq!(stats.active_tracks, 1);
        assert_eq!(stats.routed_tracks, 1);
        assert_eq!(stats.device_usage.get(&device), Some(&1));
    }
}
