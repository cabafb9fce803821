//! Time-related types for the playback control plane
//!
//! The host clock is monotonic seconds since start, advancing only while the
//! application is unpaused. Each playing clip additionally carries its own
//! virtual clock that can be suspended independently of the host clock.

use serde::{Deserialize, Serialize};

/// Absolute host-clock time in seconds since engine start
pub type HostTime = f64;

/// Duration in seconds
pub type Seconds = f64;

/// Per-clip virtual clock
///
/// Advances with the host tick while running; suspending freezes the elapsed
/// offset so playback position survives pause/unpause cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualClock {
    elapsed: Seconds,
    running: bool,
}

impl VirtualClock {
    /// Create a stopped clock at offset zero
    pub fn new() -> Self {
        Self {
            elapsed: 0.0,
            running: false,
        }
    }

    /// Start (or restart) the clock from a given offset
    pub fn start_at(&mut self, offset: Seconds) {
        self.elapsed = offset;
        self.running = true;
    }

    /// Advance the clock; no-op while suspended
    #[inline]
    pub fn advance(&mut self, dt: Seconds) {
        if self.running {
            self.elapsed += dt;
        }
    }

    /// Suspend the clock, preserving the current offset
    #[inline]
    pub fn suspend(&mut self) {
        self.running = false;
    }

    /// Resume a suspended clock
    #[inline]
    pub fn resume(&mut self) {
        self.running = true;
    }

    /// Current elapsed offset in seconds
    #[inline]
    pub fn elapsed(&self) -> Seconds {
        self.elapsed
    }

    /// Whether the clock is currently advancing
    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Reset to a stopped clock at offset zero
    pub fn reset(&mut self) {
        self.elapsed = 0.0;
        self.running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_only_while_running() {
        let mut clock = VirtualClock::new();
        clock.advance(1.0);
        assert_eq!(clock.elapsed(), 0.0);

        clock.start_at(0.5);
        clock.advance(1.0);
        assert!((clock.elapsed() - 1.5).abs() < 1e-9);

        clock.suspend();
        clock.advance(10.0);
        assert!((clock.elapsed() - 1.5).abs() < 1e-9);

        clock.resume();
        clock.advance(0.5);
        assert!((clock.elapsed() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_clock_reset() {
        let mut clock = VirtualClock::new();
        clock.start_at(3.0);
        clock.reset();
        assert_eq!(clock.elapsed(), 0.0);
        assert!(!clock.is_running());
    }
}
