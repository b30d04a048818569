// src/report.rs
//
// Per-run statistics and the final aggregate report. Membership is kept as
// sets rather than counts because a track's classification can flip until
// the run is finalized.

use crate::types::{ReportSummary, ViolationDetail};
use crate::violation::lifecycle::ActiveViolation;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::info;

/// A track counts toward the totals once its history reaches this length.
pub const MIN_TRACK_FRAMES: usize = 5;
/// Tracks whose max speed stays under this are reported as stationary.
pub const STATIONARY_THRESHOLD: f64 = 5.0;

/// COCO vehicle classes the detector collaborator is configured for.
pub fn class_name(class_id: u32) -> Option<&'static str> {
    match class_id {
        2 => Some("Car"),
        3 => Some("Motorcycle"),
        5 => Some("Bus"),
        7 => Some("Truck"),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct RunStats {
    pub total: HashSet<u64>,
    pub forward: HashSet<u64>,
    pub backward: HashSet<u64>,
    pub stationary: HashSet<u64>,
    pub violated: HashSet<u64>,
    pub violation_details: Vec<ViolationDetail>,
    pub max_speeds: HashMap<u64, f64>,
    pub classes: HashMap<u64, u32>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track has enough history to count; remember its class once.
    pub fn mark_counted(&mut self, track_id: u64, class_id: u32) {
        self.total.insert(track_id);
        self.classes.entry(track_id).or_insert(class_id);
    }

    pub fn record_speed(&mut self, track_id: u64, speed: f64) {
        let entry = self.max_speeds.entry(track_id).or_insert(0.0);
        if speed > *entry {
            *entry = speed;
        }
    }

    /// Returns true the first time this track is ever marked, which drives
    /// the one-shot `is_new_violation` flag in the frame output.
    pub fn mark_wrong_way(&mut self, track_id: u64) -> bool {
        let is_new = self.violated.insert(track_id);
        self.backward.insert(track_id);
        self.forward.remove(&track_id);
        is_new
    }

    pub fn mark_with_flow(&mut self, track_id: u64) {
        self.forward.insert(track_id);
        self.backward.remove(&track_id);
    }

    pub fn finalize_violation(&mut self, track_id: u64, violation: &ActiveViolation) {
        let class = self
            .classes
            .get(&track_id)
            .and_then(|&id| class_name(id))
            .unwrap_or("Unknown");
        self.violation_details.push(ViolationDetail {
            id: track_id,
            class_name: class.to_string(),
            start_time: violation.start_time,
            end_time: violation.end_time,
            start_frame: violation.start_frame,
            end_frame: violation.end_frame,
        });
    }
}

/// Consume the run's state into the final summary. Every counted track lands
/// in exactly one of forward / backward / stationary.
pub fn aggregate(stats: &mut RunStats, full_video: &str, cloud_url: Option<String>) -> ReportSummary {
    let mut forward = 0usize;
    let mut backward = 0usize;
    let mut stationary_count = 0usize;

    let total_ids: Vec<u64> = stats.total.iter().copied().collect();
    for track_id in total_ids {
        let max_speed = stats.max_speeds.get(&track_id).copied().unwrap_or(0.0);
        if stats.violated.contains(&track_id) {
            backward += 1;
        } else if max_speed < STATIONARY_THRESHOLD {
            stationary_count += 1;
            stats.stationary.insert(track_id);
        } else {
            forward += 1;
        }
    }

    let average_speed = if stats.max_speeds.is_empty() {
        0.0
    } else {
        let mean = stats.max_speeds.values().sum::<f64>() / stats.max_speeds.len() as f64;
        (mean * 10.0).round() / 10.0
    };

    let mut class_breakdown: BTreeMap<String, usize> = BTreeMap::new();
    for track_id in &stats.total {
        let name = stats
            .classes
            .get(track_id)
            .and_then(|&id| class_name(id))
            .unwrap_or("Other");
        *class_breakdown.entry(name.to_string()).or_insert(0) += 1;
    }

    info!(
        "Generating final report: {} vehicles total, {} violated, {} violation record(s)",
        stats.total.len(),
        stats.violated.len(),
        stats.violation_details.len()
    );

    ReportSummary {
        total: stats.total.len(),
        forward,
        backward,
        stationary: stationary_count,
        violations: stats.violated.len(),
        violation_list: stats.violation_details.clone(),
        average_speed,
        class_breakdown,
        full_video: full_video.to_string(),
        cloud_video_url: cloud_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_partitions_counted_tracks() {
        let mut stats = RunStats::new();
        // Violated track, fast track, slow track.
        stats.mark_counted(1, 2);
        stats.mark_counted(2, 2);
        stats.mark_counted(3, 7);
        stats.record_speed(1, 60.0);
        stats.record_speed(2, 42.0);
        stats.record_speed(3, 1.5);
        stats.mark_wrong_way(1);

        let summary = aggregate(&mut stats, "processed_demo.mjpeg", None);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.backward, 1);
        assert_eq!(summary.forward, 1);
        assert_eq!(summary.stationary, 1);
        assert_eq!(
            summary.forward + summary.backward + summary.stationary,
            summary.total
        );
        assert!(stats.stationary.contains(&3));
    }

    #[test]
    fn violated_track_counts_backward_even_when_slow() {
        let mut stats = RunStats::new();
        stats.mark_counted(1, 2);
        stats.record_speed(1, 2.0);
        stats.mark_wrong_way(1);

        let summary = aggregate(&mut stats, "out.mjpeg", None);
        assert_eq!(summary.backward, 1);
        assert_eq!(summary.stationary, 0);
    }

    #[test]
    fn wrong_way_flag_is_one_shot_and_flips_flow_sets() {
        let mut stats = RunStats::new();
        assert!(stats.mark_wrong_way(5));
        assert!(!stats.mark_wrong_way(5));
        assert!(stats.backward.contains(&5));
        assert!(!stats.forward.contains(&5));

        stats.mark_with_flow(5);
        assert!(stats.forward.contains(&5));
        assert!(!stats.backward.contains(&5));
        // Violated membership is permanent.
        assert!(stats.violated.contains(&5));
    }

    #[test]
    fn average_speed_is_rounded_mean_of_max_speeds() {
        let mut stats = RunStats::new();
        stats.record_speed(1, 10.0);
        stats.record_speed(1, 30.0);
        stats.record_speed(2, 15.07);

        let summary = aggregate(&mut stats, "out.mjpeg", None);
        // (30 + 15.07) / 2 = 22.535, rounded to one decimal.
        assert!((summary.average_speed - 22.5).abs() < 1e-9);
    }

    #[test]
    fn empty_run_reports_zeros() {
        let mut stats = RunStats::new();
        let summary = aggregate(&mut stats, "out.mjpeg", None);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.average_speed, 0.0);
        assert!(summary.class_breakdown.is_empty());
        assert!(summary.cloud_video_url.is_none());
    }

    #[test]
    fn class_breakdown_groups_unknown_as_other() {
        let mut stats = RunStats::new();
        stats.mark_counted(1, 2);
        stats.mark_counted(2, 2);
        stats.mark_counted(3, 5);
        stats.mark_counted(4, 99);

        let summary = aggregate(&mut stats, "out.mjpeg", None);
        assert_eq!(summary.class_breakdown["Car"], 2);
        assert_eq!(summary.class_breakdown["Bus"], 1);
        assert_eq!(summary.class_breakdown["Other"], 1);
    }
}
