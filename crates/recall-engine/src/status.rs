//! Scheduler status surface and critical region.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use recall_core::format_uptime;

/// Snapshot of the scheduler's observable state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Status {
    /// At least one member is active.
    pub is_playing: bool,
    /// Starts are queued or a run waits for initialization.
    pub is_starting: bool,
    /// Current note offset, wrapped by the device loop.
    pub note_offset: u64,
    /// Note offsets since start.
    pub note_offset_absolute: u64,
    /// Completed scheduler ticks.
    pub tick_count: u64,
    /// Device buffers reported complete.
    pub buffers_completed: u64,
    /// Active channels.
    pub channels: usize,
    /// Active playback domains.
    pub domains: usize,
    /// Musical time since start.
    pub uptime: Duration,
}

impl Status {
    /// Uptime as `MM:SS.mmm`.
    pub fn uptime_string(&self) -> String {
        format_uptime(self.uptime)
    }
}

/// Advisory reconfiguration window with a nesting count.
///
/// While any guard is alive the scheduler leaves queued commands for a
/// later tick; stages keep running.
#[derive(Debug, Default)]
pub struct CriticalRegion {
    depth: AtomicUsize,
}

impl CriticalRegion {
    /// Creates a released region.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters the region; leaving happens when the guard drops.
    pub fn enter(&self) -> CriticalGuard<'_> {
        self.depth.fetch_add(1, Ordering::AcqRel);
        CriticalGuard { region: self }
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Returns `true` while any guard is alive.
    pub fn is_held(&self) -> bool {
        self.depth() > 0
    }
}

/// Keeps a [`CriticalRegion`] entered.
#[derive(Debug)]
pub struct CriticalGuard<'a> {
    region: &'a CriticalRegion,
}

impl Drop for CriticalGuard<'_> {
    fn drop(&mut self) {
        self.region.depth.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_region_nests() {
        let region = CriticalRegion::new();
        assert!(!region.is_held());
        {
            let _outer = region.enter();
            let inner = region.enter();
            assert_eq!(region.depth(), 2);
            drop(inner);
            assert!(region.is_held());
        }
        assert_eq!(region.depth(), 0);
    }

    #[test]
    fn uptime_formats() {
        let status = Status {
            uptime: Duration::from_millis(61_250),
            ..Status::default()
        };
        assert_eq!(status.uptime_string(), "01:01.250");
    }
}
