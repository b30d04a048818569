// src/tracking/history.rs
//
// Bounded per-track position history. Tracks are created on first
// observation and never explicitly deleted; a track id missing from a
// frame's detection set is the lifecycle manager's signal, not this
// store's concern.

use std::collections::{HashMap, VecDeque};

/// Maximum stored centers per track. Oldest entries are silently evicted.
pub const TRACK_HISTORY_LEN: usize = 40;

#[derive(Debug, Clone)]
pub struct TrackRecord {
    /// First observed class wins; detectors can flicker between classes
    /// for the same physical vehicle.
    pub class_id: u32,
    /// Wrong-way hysteresis counter, decremented by the state machine.
    pub cooldown: u32,
    history: VecDeque<(f32, f32)>,
}

impl TrackRecord {
    fn new(class_id: u32) -> Self {
        Self {
            class_id,
            cooldown: 0,
            history: VecDeque::with_capacity(TRACK_HISTORY_LEN),
        }
    }

    fn push(&mut self, center: (f32, f32)) {
        self.history.push_back(center);
        if self.history.len() > TRACK_HISTORY_LEN {
            self.history.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn oldest(&self) -> Option<(f32, f32)> {
        self.history.front().copied()
    }

    pub fn newest(&self) -> Option<(f32, f32)> {
        self.history.back().copied()
    }

    pub fn centers(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.history.iter().copied()
    }
}

#[derive(Debug, Default)]
pub struct TrackHistoryStore {
    tracks: HashMap<u64, TrackRecord>,
}

impl TrackHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `center` to the track's history, creating the record (with
    /// `class_id`) on first observation. Overflow evicts the oldest center
    /// without error.
    pub fn observe(&mut self, track_id: u64, class_id: u32, center: (f32, f32)) -> &mut TrackRecord {
        let record = self
            .tracks
            .entry(track_id)
            .or_insert_with(|| TrackRecord::new(class_id));
        record.push(center);
        record
    }

    pub fn get(&self, track_id: u64) -> Option<&TrackRecord> {
        self.tracks.get(&track_id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_bounded_and_evicts_oldest() {
        let mut store = TrackHistoryStore::new();
        for i in 0..41 {
            store.observe(1, 2, (i as f32, 0.0));
        }

        let record = store.get(1).unwrap();
        assert_eq!(record.len(), TRACK_HISTORY_LEN);
        // Observation 0 is gone, observation 40 is present.
        assert_eq!(record.oldest(), Some((1.0, 0.0)));
        assert_eq!(record.newest(), Some((40.0, 0.0)));
    }

    #[test]
    fn first_observed_class_wins() {
        let mut store = TrackHistoryStore::new();
        store.observe(7, 2, (0.0, 0.0));
        store.observe(7, 5, (1.0, 0.0));
        assert_eq!(store.get(7).unwrap().class_id, 2);
    }

    #[test]
    fn tracks_are_independent() {
        let mut store = TrackHistoryStore::new();
        store.observe(1, 2, (0.0, 0.0));
        store.observe(2, 3, (5.0, 5.0));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(1).unwrap().len(), 1);
        assert_eq!(store.get(2).unwrap().newest(), Some((5.0, 5.0)));
    }
}
