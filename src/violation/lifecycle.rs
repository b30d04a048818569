// src/violation/lifecycle.rs
//
// Open/close bookkeeping for wrong-way violations. An ActiveViolation
// exists exactly while its track is reported wrong-way (hysteresis
// included); it is finalized into the permanent list when the track
// disappears, goes clear, or the stream ends.

use crate::report::RunStats;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveViolation {
    pub start_time: f64,
    pub start_frame: u64,
    pub end_time: f64,
    pub end_frame: u64,
}

#[derive(Debug, Default)]
pub struct ViolationLedger {
    active: HashMap<u64, ActiveViolation>,
}

impl ViolationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called on every wrong-way frame. Opens a violation window on the
    /// first one, extends `end` on every subsequent one.
    pub fn record_wrong_way(&mut self, track_id: u64, time: f64, frame: u64) {
        match self.active.get_mut(&track_id) {
            Some(violation) => {
                violation.end_time = time;
                violation.end_frame = frame;
            }
            None => {
                info!(
                    "Wrong-way violation opened: track {} at {:.2}s (frame {})",
                    track_id, time, frame
                );
                self.active.insert(
                    track_id,
                    ActiveViolation {
                        start_time: time,
                        start_frame: frame,
                        end_time: time,
                        end_frame: frame,
                    },
                );
            }
        }
    }

    /// Finalize the violation of a track that is present but no longer
    /// wrong-way, keeping the last recorded end. A later re-trigger starts
    /// an entirely new window.
    pub fn close_if_clear(&mut self, track_id: u64, stats: &mut RunStats) {
        if let Some(violation) = self.active.remove(&track_id) {
            debug!("Track {} back with the flow, closing violation", track_id);
            stats.finalize_violation(track_id, &violation);
        }
    }

    /// Finalize every open violation whose track id is absent from the
    /// current frame's detection set.
    pub fn close_vanished(&mut self, current_ids: &HashSet<u64>, stats: &mut RunStats) {
        let mut ended: Vec<u64> = self
            .active
            .keys()
            .filter(|id| !current_ids.contains(id))
            .copied()
            .collect();
        // Stable report order regardless of map iteration.
        ended.sort_unstable();
        for track_id in ended {
            if let Some(violation) = self.active.remove(&track_id) {
                debug!("Track {} vanished, closing violation", track_id);
                stats.finalize_violation(track_id, &violation);
            }
        }
    }

    /// Force-finalize everything still open, using the last recorded end.
    /// Called at stream end and on the error/cancellation paths.
    pub fn finalize_all(&mut self, stats: &mut RunStats) {
        let mut remaining: Vec<(u64, ActiveViolation)> = self.active.drain().collect();
        remaining.sort_unstable_by_key(|(track_id, _)| *track_id);
        for (track_id, violation) in remaining {
            stats.finalize_violation(track_id, &violation);
        }
    }

    pub fn is_open(&self, track_id: u64) -> bool {
        self.active.contains_key(&track_id)
    }

    pub fn open_count(&self) -> usize {
        self.active.len()
    }

    pub fn get(&self, track_id: u64) -> Option<&ActiveViolation> {
        self.active.get(&track_id)
    }
}
