//! Frame counter and dropped-frame accounting.
//!
//! One [`FrameStats`] instance is owned by each driver, not shared globally,
//! so independent drivers (and tests) account frames in isolation.

use tracing::debug;

/// Outcome of observing one fetched frame number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTick {
    /// Difference to the previously observed frame number.  Zero on the
    /// first tick and on a duplicate fetch; negative when the source
    /// restarted its counter.
    pub frame_diff: i64,
    /// Whether this tick crossed a gap of more than one frame.
    pub dropped: bool,
}

impl FrameTick {
    /// A duplicate fetch delivered a frame already processed; downstream
    /// processing must be skipped for this tick.
    pub fn is_duplicate(&self) -> bool {
        self.frame_diff == 0
    }
}

/// Cumulative frame statistics for one polling loop.
#[derive(Debug, Default)]
pub struct FrameStats {
    last_frame_number: u64,
    frame_count: i64,
    dropped_frame_count: i64,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for a newly fetched frame number.
    ///
    /// The first observed frame only initialises the counter.  Afterwards the
    /// delta to the previous frame accumulates into the total frame count
    /// unconditionally; a gap larger than one additionally accumulates into
    /// the dropped count and emits a diagnostic.  A negative delta means the
    /// source restarted its counter: the drop path is suppressed but the
    /// counter update is not.
    pub fn observe(&mut self, current: u64) -> FrameTick {
        let mut frame_diff = 0i64;
        let mut dropped = false;
        if self.last_frame_number != 0 {
            frame_diff = current as i64 - self.last_frame_number as i64;
            self.frame_count += frame_diff;
            if frame_diff > 1 {
                self.dropped_frame_count += frame_diff;
                dropped = true;
                // Integer-truncating percentage, kept exactly as the
                // diagnostics have always reported it.
                let dropped_pct = if self.frame_count != 0 {
                    (self.dropped_frame_count / self.frame_count * 100) as f64
                } else {
                    0.0
                };
                debug!(
                    more = frame_diff,
                    dropped = self.dropped_frame_count,
                    total = self.frame_count,
                    percent = dropped_pct,
                    "frame(s) dropped, consider adjusting rates"
                );
            }
        }
        self.last_frame_number = current;
        FrameTick { frame_diff, dropped }
    }

    pub fn last_frame_number(&self) -> u64 {
        self.last_frame_number
    }

    pub fn frame_count(&self) -> i64 {
        self.frame_count
    }

    pub fn dropped_frame_count(&self) -> i64 {
        self.dropped_frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_only_initialises() {
        let mut stats = FrameStats::new();
        let tick = stats.observe(5);
        assert_eq!(tick.frame_diff, 0);
        assert!(tick.is_duplicate());
        assert!(!tick.dropped);
        assert_eq!(stats.last_frame_number(), 5);
        assert_eq!(stats.frame_count(), 0);
        assert_eq!(stats.dropped_frame_count(), 0);
    }

    #[test]
    fn sequence_5_6_8_accounts_one_drop() {
        // End-to-end scenario: tick 1 initialises, tick 2 is a clean step,
        // tick 3 crosses a gap of two.
        let mut stats = FrameStats::new();

        let t1 = stats.observe(5);
        assert_eq!(t1.frame_diff, 0);

        let t2 = stats.observe(6);
        assert_eq!(t2.frame_diff, 1);
        assert!(!t2.dropped);
        assert_eq!(stats.dropped_frame_count(), 0);

        let t3 = stats.observe(8);
        assert_eq!(t3.frame_diff, 2);
        assert!(t3.dropped);
        assert_eq!(stats.frame_count(), 3);
        assert_eq!(stats.dropped_frame_count(), 2);
    }

    #[test]
    fn duplicate_frame_is_flagged() {
        let mut stats = FrameStats::new();
        stats.observe(10);
        stats.observe(11);
        let tick = stats.observe(11);
        assert!(tick.is_duplicate());
        assert!(!tick.dropped);
    }

    #[test]
    fn counter_reset_suppresses_drop_but_not_count() {
        let mut stats = FrameStats::new();
        stats.observe(100);
        stats.observe(101);
        let tick = stats.observe(3);
        assert_eq!(tick.frame_diff, -98);
        assert!(!tick.dropped);
        assert_eq!(stats.dropped_frame_count(), 0);
        // The counter update is not suppressed.
        assert_eq!(stats.frame_count(), 1 - 98);
        assert_eq!(stats.last_frame_number(), 3);
    }

    #[test]
    fn dropped_never_exceeds_frame_count_on_monotonic_input() {
        // Property from the design contract: over any monotonic frame-number
        // sequence the dropped count stays bounded by the frame count.
        let sequences: &[&[u64]] = &[
            &[1, 2, 3, 4, 5],
            &[5, 6, 8],
            &[1, 100, 101, 250],
            &[7, 7, 7, 9],
            &[2, 50, 50, 51, 1000],
        ];
        for seq in sequences {
            let mut stats = FrameStats::new();
            for &n in *seq {
                stats.observe(n);
                assert!(
                    stats.dropped_frame_count() <= stats.frame_count(),
                    "invariant violated on {seq:?}"
                );
            }
        }
    }
}
