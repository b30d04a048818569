// src/tracking/flow.rs
//
// Direction cache and majority-flow estimation. The cache is a bounded
// recency map of track id -> last heading; re-insertion refreshes recency
// and eviction is strictly oldest-inserted-first. It feeds the dominant
// flow estimate only and is never track storage of record.

use std::collections::{HashMap, VecDeque};

/// Bound on remembered per-track headings.
pub const DIRECTION_CACHE_CAP: usize = 100;
/// Minimum cached headings before a majority direction is reported.
const MIN_FLOW_SAMPLES: usize = 3;

const SECTOR_COUNT: usize = 8;
const SECTOR_WIDTH: f64 = 45.0;

#[derive(Debug)]
pub struct DirectionCache {
    headings: HashMap<u64, f64>,
    /// Insertion order, oldest first. Bounded by `capacity`, so the linear
    /// removal on refresh stays cheap.
    order: VecDeque<u64>,
    capacity: usize,
}

impl Default for DirectionCache {
    fn default() -> Self {
        Self::with_capacity(DIRECTION_CACHE_CAP)
    }
}

impl DirectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            headings: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert or refresh a track's heading at the most-recent position,
    /// evicting the least-recently-inserted entry past capacity.
    pub fn insert(&mut self, track_id: u64, heading: f64) {
        if self.headings.insert(track_id, heading).is_some() {
            self.order.retain(|&id| id != track_id);
        }
        self.order.push_back(track_id);
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.headings.remove(&evicted);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.headings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headings.is_empty()
    }

    pub fn contains(&self, track_id: u64) -> bool {
        self.headings.contains_key(&track_id)
    }

    /// Dominant flow heading: bucket every cached heading into 8 sectors of
    /// 45° and return the center of the most populated one. Ties resolve to
    /// the lowest-numbered sector. Recomputed from the full cache each call.
    pub fn majority_direction(&self) -> Option<f64> {
        if self.headings.len() < MIN_FLOW_SAMPLES {
            return None;
        }

        let mut counts = [0usize; SECTOR_COUNT];
        for &heading in self.headings.values() {
            let sector = (((heading + SECTOR_WIDTH / 2.0) / SECTOR_WIDTH).floor() as usize)
                % SECTOR_COUNT;
            counts[sector] += 1;
        }

        let mut best_sector = 0;
        let mut best_count = counts[0];
        for (sector, &count) in counts.iter().enumerate().skip(1) {
            if count > best_count {
                best_sector = sector;
                best_count = count;
            }
        }

        Some(best_sector as f64 * SECTOR_WIDTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_below_three_entries() {
        let mut cache = DirectionCache::new();
        cache.insert(1, 10.0);
        cache.insert(2, 12.0);
        assert_eq!(cache.majority_direction(), None);
    }

    #[test]
    fn same_sector_headings_return_sector_center() {
        let mut cache = DirectionCache::new();
        // 370° arrives already normalized to 10° by the kinematics stage.
        cache.insert(1, 10.0);
        cache.insert(2, 12.0);
        cache.insert(3, 10.0);
        assert_eq!(cache.majority_direction(), Some(0.0));
    }

    #[test]
    fn majority_wins_and_ties_take_lowest_sector() {
        let mut cache = DirectionCache::new();
        cache.insert(1, 0.0);
        cache.insert(2, 2.0);
        cache.insert(3, 180.0);
        assert_eq!(cache.majority_direction(), Some(0.0));

        // 2 vs 2: sector 0 beats sector 4.
        cache.insert(4, 182.0);
        assert_eq!(cache.majority_direction(), Some(0.0));
    }

    #[test]
    fn wraparound_headings_land_in_sector_zero() {
        let mut cache = DirectionCache::new();
        cache.insert(1, 350.0);
        cache.insert(2, 355.0);
        cache.insert(3, 4.0);
        assert_eq!(cache.majority_direction(), Some(0.0));
    }

    #[test]
    fn capacity_evicts_least_recently_inserted() {
        let mut cache = DirectionCache::new();
        for id in 0..100 {
            cache.insert(id, 90.0);
        }
        assert_eq!(cache.len(), DIRECTION_CACHE_CAP);

        // Refreshing id 0 moves it off the eviction end.
        cache.insert(0, 45.0);
        cache.insert(200, 90.0);
        assert_eq!(cache.len(), DIRECTION_CACHE_CAP);
        assert!(cache.contains(0));
        assert!(cache.contains(200));
        // Id 1 was the least-recently-inserted entry.
        assert!(!cache.contains(1));
    }
}
