// src/violation/state_machine.rs
//
// Per-track wrong-way decision with cooldown hysteresis. A single frame of
// opposing heading flags the track and arms a 30-frame cooldown; the track
// keeps reporting wrong-way while the cooldown drains, so one-frame heading
// jitter cannot toggle the violation state.

use crate::tracking::history::TrackRecord;
use crate::tracking::kinematics::MIN_SPEED_THRESHOLD;

/// Heading must deviate from the reference by more than this to flag.
pub const WRONG_WAY_ANGLE_DIFF: f64 = 120.0;
/// Hysteresis frames after the triggering condition ends.
pub const VIOLATION_COOLDOWN: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrongWayState {
    Clear,
    /// Actively violating this frame; cooldown re-armed.
    Flagged,
    /// Grace period; still reported as wrong-way externally.
    Cooling,
}

impl WrongWayState {
    /// `Flagged` and `Cooling` are indistinguishable to consumers; only the
    /// internal counter separates them.
    pub fn is_wrong_way(self) -> bool {
        !matches!(self, WrongWayState::Clear)
    }
}

/// Absolute angular difference folded to [0, 180].
pub fn angular_difference(a: f64, b: f64) -> f64 {
    let mut diff = (a - b).abs();
    if diff > 180.0 {
        diff = 360.0 - diff;
    }
    diff
}

/// Advance the track's wrong-way state by one frame.
///
/// An unknown reference or sub-threshold speed forces no transition from new
/// evidence, but an armed cooldown still decays through the `Cooling` branch.
pub fn assess(
    record: &mut TrackRecord,
    speed: f64,
    heading: f64,
    reference: Option<f64>,
) -> WrongWayState {
    if let Some(reference) = reference {
        if speed > MIN_SPEED_THRESHOLD && angular_difference(heading, reference) > WRONG_WAY_ANGLE_DIFF
        {
            record.cooldown = VIOLATION_COOLDOWN;
            return WrongWayState::Flagged;
        }
    }

    if record.cooldown > 0 {
        record.cooldown -= 1;
        return WrongWayState::Cooling;
    }

    WrongWayState::Clear
}
