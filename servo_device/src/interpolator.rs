//! Linear interpolation between sparse host reference updates on the
//! fast device control tick (§4.1).
//!
//! Timestamps are supplied by the caller as microseconds from a
//! monotonic free-running counter (the ISR's timer, in the real
//! firmware) rather than read internally, so the type stays
//! deterministic and unit-testable without a wall clock.

use servo_common::ReferenceTriplet;

/// Three-triplet sliding window plus the timing state needed to
/// reconstruct a reference at any point between two `loadNew` calls
/// (§3 `ReferenceInterpolator state`).
#[derive(Debug, Clone, Copy)]
pub struct ReferenceInterpolator {
    /// `t[0]` = previous, `t[1]` = current (hold value), `t[2]` = next.
    t: [ReferenceTriplet; 3],
    /// Timestamp of the most recent `loadNew` [µs].
    last_load_timestamp_us: u64,
    /// Timestamp snapshotted by the most recent `updateTiming` [µs].
    last_get_timestamp_us: u64,
    /// Nominal interval between host reference updates [µs].
    load_time_interval_us: u32,
    /// Device control-loop tick period [µs].
    get_time_interval_us: u32,
    /// Signed phase offset applied before dividing by
    /// `load_time_interval_us`, letting the device centre its sampling
    /// window between host arrivals.
    pub mid_point_time_offset_us: i32,
    /// Set on reset, cleared after the second consecutive `loadNew`.
    timing_invalid: bool,
    /// Consecutive `loadNew` calls since the last reset (saturates at 2).
    loads_since_reset: u8,
}

impl ReferenceInterpolator {
    /// Construct an interpolator with the given cadence configuration.
    /// Starts with `timing_invalid = true` (§3 invariant (ii)): until
    /// two loads have arrived, `getNext` holds `t[1]`.
    pub fn new(load_time_interval_us: u32, get_time_interval_us: u32) -> Self {
        Self {
            t: [ReferenceTriplet::default(); 3],
            last_load_timestamp_us: 0,
            last_get_timestamp_us: 0,
            load_time_interval_us,
            get_time_interval_us,
            mid_point_time_offset_us: 0,
            timing_invalid: true,
            loads_since_reset: 0,
        }
    }

    /// Slide the window and stamp the load time (§4.1 `loadNew`).
    pub fn load_new(&mut self, now_us: u64, triplet: ReferenceTriplet) {
        self.t[0] = self.t[1];
        self.t[1] = self.t[2];
        self.t[2] = triplet;
        self.last_load_timestamp_us = now_us;

        if self.loads_since_reset < 2 {
            self.loads_since_reset += 1;
        }
        if self.loads_since_reset >= 2 {
            self.timing_invalid = false;
        }
    }

    /// Snapshot the tick timestamp. Must be called once per control
    /// tick before `get_next` (§4.1 `updateTiming`). No effect while
    /// `timing_invalid`.
    pub fn update_timing(&mut self, now_us: u64) {
        if self.timing_invalid {
            return;
        }
        self.last_get_timestamp_us = now_us;
    }

    /// Mark the timing state stale: the next `get_next` holds `t[1]`
    /// until two fresh loads arrive (§4.1 `resetTiming`).
    pub fn reset_timing(&mut self) {
        self.timing_invalid = true;
        self.last_load_timestamp_us = 0;
        self.last_get_timestamp_us = 0;
        self.loads_since_reset = 0;
    }

    /// Reconfigure the device tick cadence.
    pub fn set_get_time_interval(&mut self, us: u32) {
        self.get_time_interval_us = us;
    }

    /// Reconfigure the host update cadence.
    pub fn set_load_time_interval(&mut self, us: u32) {
        self.load_time_interval_us = us;
    }

    /// The interpolation fraction used by `get_next`: clamp((last_get -
    /// last_load + offset) / load_interval, 0, 1). Exposed for testing
    /// invariant (i)/(iii) of §3 directly.
    pub fn fraction(&self) -> f64 {
        if self.timing_invalid || self.load_time_interval_us == 0 {
            return 0.0;
        }
        let elapsed = self.last_get_timestamp_us as i64 - self.last_load_timestamp_us as i64
            + self.mid_point_time_offset_us as i64;
        (elapsed as f64 / self.load_time_interval_us as f64).clamp(0.0, 1.0)
    }

    /// Linearly interpolate between `t[1]` and `t[2]` at the current
    /// phase, or hold `t[1]` while `timing_invalid` (§4.1 `getNext`).
    pub fn get_next(&self) -> ReferenceTriplet {
        if self.timing_invalid {
            return self.t[1];
        }

        let f = self.fraction();
        let a = self.t[1];
        let b = self.t[2];
        ReferenceTriplet {
            position: a.position + (b.position - a.position) * f as f32,
            velocity: lerp_i16(a.velocity, b.velocity, f),
            feed_forward: lerp_i16(a.feed_forward, b.feed_forward, f),
        }
    }

    /// Whether the most recent `loadNew` is more than `multiple *
    /// load_time_interval_us` old, as of `now_us` — the watchdog check
    /// driving §4.3's hold/disable policy (§4.1 Failure).
    pub fn is_stale(&self, now_us: u64, multiple: u32) -> bool {
        if self.timing_invalid {
            return false;
        }
        let threshold = self.load_time_interval_us as u64 * multiple as u64;
        now_us.saturating_sub(self.last_load_timestamp_us) > threshold
    }

    /// The configured device tick period [µs].
    pub fn get_time_interval_us(&self) -> u32 {
        self.get_time_interval_us
    }
}

fn lerp_i16(a: i16, b: i16, f: f64) -> i16 {
    (a as f64 + (b as f64 - a as f64) * f).round() as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triplet(p: f32) -> ReferenceTriplet {
        ReferenceTriplet {
            position: p,
            velocity: 0,
            feed_forward: 0,
        }
    }

    #[test]
    fn holds_t1_while_timing_invalid() {
        let mut interp = ReferenceInterpolator::new(12_000, 1_200);
        interp.load_new(0, triplet(1.0));
        // Only one load so far — still invalid.
        interp.update_timing(1_000);
        assert_eq!(interp.get_next(), triplet(0.0));
    }

    #[test]
    fn clears_invalid_after_second_load() {
        let mut interp = ReferenceInterpolator::new(12_000, 1_200);
        interp.load_new(0, triplet(1.0));
        interp.load_new(12_000, triplet(2.0));
        interp.update_timing(12_000);
        // At f=0, getNext == t[1] == the first loaded triplet.
        let out = interp.get_next();
        assert!((out.position - 1.0).abs() < 1e-6);
    }

    #[test]
    fn interpolates_linearly_between_t1_and_t2() {
        let mut interp = ReferenceInterpolator::new(12_000, 1_200);
        interp.load_new(0, triplet(0.0));
        interp.load_new(12_000, triplet(1.0));
        interp.load_new(24_000, triplet(2.0));
        // t[1] = 1.0, t[2] = 2.0, last_load_timestamp_us = 24_000.
        interp.update_timing(24_000 + 6_000); // halfway to next load
        let out = interp.get_next();
        assert!((out.position - 1.5).abs() < 1e-3);
    }

    #[test]
    fn fraction_is_clamped_to_unit_interval() {
        let mut interp = ReferenceInterpolator::new(12_000, 1_200);
        interp.load_new(0, triplet(0.0));
        interp.load_new(12_000, triplet(1.0));
        interp.update_timing(12_000 + 100_000); // far past the next load
        assert_eq!(interp.fraction(), 1.0);
    }

    #[test]
    fn monotone_phase_between_loads() {
        let mut interp = ReferenceInterpolator::new(12_000, 1_200);
        interp.load_new(0, triplet(0.0));
        interp.load_new(12_000, triplet(1.0));

        let mut last = 0.0;
        for tick in 0..10 {
            interp.update_timing(12_000 + tick * 1_200);
            let f = interp.fraction();
            assert!(f >= last - 1e-12);
            assert!((0.0..=1.0).contains(&f));
            last = f;
        }
    }

    #[test]
    fn reset_timing_forces_hold_until_two_loads() {
        let mut interp = ReferenceInterpolator::new(12_000, 1_200);
        interp.load_new(0, triplet(0.0));
        interp.load_new(12_000, triplet(1.0));
        interp.update_timing(18_000);
        assert!((interp.get_next().position - 0.0).abs() > 1e-9 || interp.fraction() > 0.0);

        interp.reset_timing();
        assert_eq!(interp.get_next(), triplet(1.0));
        interp.load_new(20_000, triplet(5.0));
        interp.update_timing(20_500);
        // Still invalid: only one load since reset.
        assert_eq!(interp.get_next(), triplet(1.0));
    }

    #[test]
    fn is_stale_after_missed_loads() {
        let mut interp = ReferenceInterpolator::new(12_000, 1_200);
        interp.load_new(0, triplet(0.0));
        interp.load_new(12_000, triplet(1.0));
        assert!(!interp.is_stale(12_000 + 20_000, 2));
        assert!(interp.is_stale(12_000 + 30_000, 2));
    }

    #[test]
    fn mid_point_offset_shifts_phase() {
        let mut interp = ReferenceInterpolator::new(12_000, 1_200);
        interp.mid_point_time_offset_us = 6_000;
        interp.load_new(0, triplet(0.0));
        interp.load_new(12_000, triplet(1.0));
        interp.update_timing(12_000);
        // Without the offset f=0; with +6000us offset, f=0.5.
        assert!((interp.fraction() - 0.5).abs() < 1e-6);
    }
}
