// app/state.rs - Shared Region State and Capture Context
//
// The region is the only in-process mutable value shared between the
// watcher (writer) and the capture thread (reader). The lock is held only
// for the copy, never across device or filesystem calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

/// A rectangle in desktop pixel coordinates, stored as edges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Size of the duplicated desktop in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesktopSize {
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    /// Build from an origin and a size (`right = x + width`)
    pub fn from_origin_size(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            left: x,
            top: y,
            right: x.saturating_add(width),
            bottom: y.saturating_add(height),
        }
    }

    /// The whole desktop
    pub fn full(desktop: DesktopSize) -> Self {
        Self::new(0, 0, desktop.width as i32, desktop.height as i32)
    }

    pub fn width(&self) -> i32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> i32 {
        self.bottom.saturating_sub(self.top)
    }

    /// Whether the rectangle has a positive area
    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Clamp into `[0, width] x [0, height]` keeping at least one pixel.
    ///
    /// The result always satisfies `0 <= left < right <= width` and
    /// `0 <= top < bottom <= height` for a non-empty desktop, whatever the
    /// input (inverted, negative, or entirely off-screen).
    pub fn clamp_to(&self, desktop: DesktopSize) -> Region {
        let max_w = desktop.width.max(1).min(i32::MAX as u32) as i32;
        let max_h = desktop.height.max(1).min(i32::MAX as u32) as i32;

        let left = self.left.clamp(0, max_w - 1);
        let top = self.top.clamp(0, max_h - 1);
        let right = self.right.clamp(left + 1, max_w);
        let bottom = self.bottom.clamp(top + 1, max_h);

        Region { left, top, right, bottom }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "L={} T={} R={} B={} ({}x{})",
            self.left,
            self.top,
            self.right,
            self.bottom,
            self.width(),
            self.height()
        )
    }
}

/// A consistent copy of the shared region and its update counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSnapshot {
    pub region: Region,
    /// Strictly increasing; 0 until the first write
    pub updates: u64,
}

/// Mutex-guarded region plus update counter
#[derive(Debug)]
pub struct SharedRegionState {
    inner: Mutex<RegionSnapshot>,
}

impl Default for SharedRegionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedRegionState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegionSnapshot {
                region: Region::default(),
                updates: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegionSnapshot> {
        // A panicking writer cannot leave the plain-old-data value half written
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot region and counter under one lock acquisition
    pub fn read(&self) -> RegionSnapshot {
        *self.lock()
    }

    /// Replace the region and bump the counter; returns the new counter value
    pub fn write(&self, region: Region) -> u64 {
        let mut guard = self.lock();
        guard.region = region;
        guard.updates += 1;
        guard.updates
    }

    /// Write `region` only if nothing has been written yet.
    ///
    /// Returns the new counter value, or `None` when a region was already set.
    pub fn write_if_unset(&self, region: Region) -> Option<u64> {
        let mut guard = self.lock();
        if guard.updates != 0 {
            return None;
        }
        guard.region = region;
        guard.updates = 1;
        Some(1)
    }
}

/// Everything both threads need, constructed once by the coordinator
#[derive(Debug, Default)]
pub struct CaptureContext {
    /// Current capture region
    pub region: SharedRegionState,
    /// Process-wide cooperative stop flag
    stop: Arc<AtomicBool>,
}

impl CaptureContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cooperative shutdown of every loop observing this context
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Handle for signal handlers that cannot borrow the context
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESKTOP: DesktopSize = DesktopSize { width: 1920, height: 1080 };

    fn assert_within(r: Region, d: DesktopSize) {
        assert!(0 <= r.left && r.left < r.right && r.right <= d.width as i32, "{r:?}");
        assert!(0 <= r.top && r.top < r.bottom && r.bottom <= d.height as i32, "{r:?}");
    }

    #[test]
    fn origin_size_converts_to_edges() {
        assert_eq!(Region::from_origin_size(10, 20, 100, 200), Region::new(10, 20, 110, 220));
    }

    #[test]
    fn clamp_keeps_inside_region_unchanged() {
        let r = Region::new(10, 20, 110, 220);
        assert_eq!(r.clamp_to(DESKTOP), r);
    }

    #[test]
    fn clamp_trims_overhanging_edges() {
        let r = Region::new(-50, -10, 5000, 3000).clamp_to(DESKTOP);
        assert_eq!(r, Region::new(0, 0, 1920, 1080));
    }

    #[test]
    fn clamp_handles_degenerate_and_offscreen_input() {
        let cases = [
            Region::new(100, 100, 100, 100),
            Region::new(300, 300, 10, 10),
            Region::new(5000, 5000, 6000, 6000),
            Region::new(-500, -500, -100, -100),
            Region::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX),
            Region::new(1919, 1079, 1919, 1079),
        ];
        for r in cases {
            assert_within(r.clamp_to(DESKTOP), DESKTOP);
        }
    }

    #[test]
    fn clamp_property_over_grid() {
        let small = DesktopSize { width: 7, height: 5 };
        for l in -3..10 {
            for t in -3..8 {
                for w in [-4, 0, 1, 3, 20] {
                    for h in [-4, 0, 1, 2, 20] {
                        let r = Region::from_origin_size(l, t, w, h).clamp_to(small);
                        assert_within(r, small);
                    }
                }
            }
        }
    }

    #[test]
    fn counter_starts_at_one_and_increases() {
        let state = SharedRegionState::new();
        assert_eq!(state.read().updates, 0);

        assert_eq!(state.write(Region::full(DESKTOP)), 1);
        assert_eq!(state.write(Region::new(1, 2, 3, 4)), 2);

        let snap = state.read();
        assert_eq!(snap.region, Region::new(1, 2, 3, 4));
        assert_eq!(snap.updates, 2);
    }

    #[test]
    fn default_region_never_overrides_a_written_one() {
        let state = SharedRegionState::new();
        assert_eq!(state.write_if_unset(Region::full(DESKTOP)), Some(1));
        assert_eq!(state.write_if_unset(Region::new(0, 0, 10, 10)), None);
        assert_eq!(state.read().region, Region::full(DESKTOP));

        let state = SharedRegionState::new();
        state.write(Region::new(1, 2, 3, 4));
        assert_eq!(state.write_if_unset(Region::full(DESKTOP)), None);
        assert_eq!(state.read(), RegionSnapshot { region: Region::new(1, 2, 3, 4), updates: 1 });
    }

    #[test]
    fn stop_flag_is_shared() {
        let ctx = CaptureContext::new();
        let flag = ctx.stop_flag();
        assert!(!ctx.should_stop());
        flag.store(true, Ordering::SeqCst);
        assert!(ctx.should_stop());
    }
}
