//! Shared cache of regions discovered by any bot in the fleet
//!
//! First sighting of a handle wins. Records are never updated or removed,
//! so the cache may lag behind the grid; callers must not treat it as
//! authoritative.

use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Width of a region in metres
pub const REGION_SIZE: u32 = 256;

/// Descriptive record of a grid region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRecord {
    pub name: String,
    /// Composite handle: world X metres in the high 32 bits, world Y in the low 32
    pub handle: u64,
    /// Grid X coordinate (region units)
    pub x: u32,
    /// Grid Y coordinate (region units)
    pub y: u32,
}

impl RegionRecord {
    pub fn new(name: impl Into<String>, x: u32, y: u32) -> Self {
        Self {
            name: name.into(),
            handle: region_handle(x, y),
            x,
            y,
        }
    }
}

/// Encode grid coordinates into a region handle
#[inline]
pub fn region_handle(x: u32, y: u32) -> u64 {
    ((x as u64 * REGION_SIZE as u64) << 32) | (y as u64 * REGION_SIZE as u64)
}

/// Decode a region handle back into grid coordinates
#[inline]
pub fn handle_to_grid(handle: u64) -> (u32, u32) {
    let world_x = (handle >> 32) as u32;
    let world_y = (handle & 0xFFFF_FFFF) as u32;
    (world_x / REGION_SIZE, world_y / REGION_SIZE)
}

/// Insert-if-absent region cache, guarded by its own lock
#[derive(Debug, Default)]
pub struct RegionRegistry {
    regions: Mutex<HashMap<u64, RegionRecord>>,
}

impl RegionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a region sighting. Returns true if the handle was new.
    pub fn observe(&self, record: RegionRecord) -> bool {
        let mut regions = self.regions.lock();
        if regions.contains_key(&record.handle) {
            return false;
        }
        regions.insert(record.handle, record);
        true
    }

    pub fn get(&self, handle: u64) -> Option<RegionRecord> {
        self.regions.lock().get(&handle).cloned()
    }

    pub fn len(&self) -> usize {
        self.regions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.lock().is_empty()
    }

    /// Copy every record out, ordered by handle
    pub fn snapshot(&self) -> Vec<RegionRecord> {
        let mut records: Vec<RegionRecord> = self.regions.lock().values().cloned().collect();
        records.sort_by_key(|r| r.handle);
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_region_handle_encoding() {
        let record = RegionRecord::new("Oak", 1000, 1001);
        assert_eq!(record.handle, (256_000u64 << 32) | 256_256);
        assert_eq!(handle_to_grid(record.handle), (1000, 1001));
    }

    #[test]
    fn test_observe_inserts_new_region() {
        let registry = RegionRegistry::new();

        assert!(registry.observe(RegionRecord::new("Oak", 1000, 1000)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_first_seen_name_wins() {
        let registry = RegionRegistry::new();
        let first = RegionRecord::new("A", 1000, 1000);
        let handle = first.handle;
        let mut renamed = first.clone();
        renamed.name = "B".to_string();

        assert!(registry.observe(first));
        assert!(!registry.observe(renamed));

        assert_eq!(registry.get(handle).unwrap().name, "A");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_ordered_by_handle() {
        let registry = RegionRegistry::new();
        registry.observe(RegionRecord::new("East", 1001, 1000));
        registry.observe(RegionRecord::new("West", 999, 1000));
        registry.observe(RegionRecord::new("Centre", 1000, 1000));

        let names: Vec<String> = registry.snapshot().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["West", "Centre", "East"]);
    }

    #[test]
    fn test_concurrent_observers_insert_once() {
        let registry = Arc::new(RegionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    registry.observe(RegionRecord::new(format!("Oak{}", i), 1000, 1000))
                })
            })
            .collect();

        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|new| *new)
            .count();

        assert_eq!(inserted, 1);
        assert_eq!(registry.len(), 1);
    }
}
