// src/tracking/kinematics.rs
//
// Speed and heading from a track's bounded history. The ×15 scalar maps
// pixel-displacement-per-frame onto a rough 0-100 range; it is a
// calibration knob, not a physical conversion, and the 5 / 5.0 thresholds
// elsewhere are tuned against it. Treat speeds as relative, not absolute.

use crate::tracking::history::TrackRecord;

/// Below this many samples a track yields speed 0 / heading 0 and is not
/// wrong-way eligible.
pub const MIN_SAMPLES: usize = 3;
/// Minimum speed for a heading to be considered meaningful.
pub const MIN_SPEED_THRESHOLD: f64 = 5.0;

const SPEED_SCALAR: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kinematics {
    pub speed: f64,
    /// Degrees in [0, 360); 0 unless `speed > MIN_SPEED_THRESHOLD`.
    pub heading: f64,
}

impl Kinematics {
    pub fn is_moving(&self) -> bool {
        self.speed > MIN_SPEED_THRESHOLD
    }
}

/// Displacement between the oldest and newest stored centers, averaged over
/// the history length and scaled.
pub fn estimate(record: &TrackRecord) -> Kinematics {
    if record.len() < MIN_SAMPLES {
        return Kinematics {
            speed: 0.0,
            heading: 0.0,
        };
    }

    // Both ends exist once len >= MIN_SAMPLES.
    let (ox, oy) = record.oldest().unwrap_or((0.0, 0.0));
    let (nx, ny) = record.newest().unwrap_or((0.0, 0.0));
    let dx = (nx - ox) as f64;
    let dy = (ny - oy) as f64;
    let displacement = (dx * dx + dy * dy).sqrt();
    let speed = displacement / record.len() as f64 * SPEED_SCALAR;

    let mut heading = 0.0;
    if speed > MIN_SPEED_THRESHOLD {
        heading = dy.atan2(dx).to_degrees();
        if heading < 0.0 {
            heading += 360.0;
        }
    }

    Kinematics { speed, heading }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::history::TrackHistoryStore;

    fn track_with_path(path: &[(f32, f32)]) -> TrackHistoryStore {
        let mut store = TrackHistoryStore::new();
        for &center in path {
            store.observe(1, 2, center);
        }
        store
    }

    #[test]
    fn short_history_yields_zero() {
        let store = track_with_path(&[(0.0, 0.0), (50.0, 0.0)]);
        let k = estimate(store.get(1).unwrap());
        assert_eq!(k.speed, 0.0);
        assert_eq!(k.heading, 0.0);
        assert!(!k.is_moving());
    }

    #[test]
    fn speed_is_displacement_over_length_scaled() {
        // 3 samples, 20px total displacement: 20 / 3 * 15 = 100.
        let store = track_with_path(&[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]);
        let k = estimate(store.get(1).unwrap());
        assert!((k.speed - 100.0).abs() < 1e-9);
        assert_eq!(k.heading, 0.0);
        assert!(k.is_moving());
    }

    #[test]
    fn heading_normalized_into_0_360() {
        // Moving up the image (negative y): atan2 gives -90, normalized 270.
        let store = track_with_path(&[(0.0, 20.0), (0.0, 10.0), (0.0, 0.0)]);
        let k = estimate(store.get(1).unwrap());
        assert!((k.heading - 270.0).abs() < 1e-9);
    }

    #[test]
    fn slow_track_reports_zero_heading() {
        // 1px over 3 frames: speed 5.0, not above the threshold.
        let store = track_with_path(&[(0.0, 0.0), (0.5, 0.0), (1.0, 0.0)]);
        let k = estimate(store.get(1).unwrap());
        assert!((k.speed - 5.0).abs() < 1e-9);
        assert_eq!(k.heading, 0.0);
        assert!(!k.is_moving());
    }
}
