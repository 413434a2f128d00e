//! Lazy trajectory sampling (§4.5, §9 "Lazy trajectory pipeline").
//!
//! `TrajectorySampler` is the generic pull-style interpolator: given a
//! producer of `TrajectoryItem`s spaced `input_dt` apart, it yields a
//! smoothly interpolated sample at any accumulated time. The
//! playback-speed wrapper (`PlaybackSpeedProducer`) sits in front of it
//! as just another producer, exactly the way the reference
//! implementation nests one `SamplingHandler` inside another.

use servo_common::trajectory::TrajectoryItem;
use servo_common::{Error, Result};

use crate::dynamics::JointDynamics;

/// Pull-style producer of `TrajectoryItem`s. `None` signals the
/// underlying sequence is exhausted.
pub trait ItemSource {
    fn next_item(&mut self) -> Option<TrajectoryItem>;
}

impl<F: FnMut() -> Option<TrajectoryItem>> ItemSource for F {
    fn next_item(&mut self) -> Option<TrajectoryItem> {
        self()
    }
}

/// Interpolates between two cached neighbours of a lazily-pulled
/// producer at caller-driven time advance (§4.5, §3 "TrajectorySampler
/// state").
pub struct TrajectorySampler<S: ItemSource> {
    source: S,
    input_dt: f64,
    interpol_t: f64,
    n: TrajectoryItem,
    np1: TrajectoryItem,
    reached_end: bool,
}

impl<S: ItemSource> TrajectorySampler<S> {
    /// Construct a sampler, pulling the first two items from `source`
    /// to seed the interpolation window. `source` must yield at least
    /// one item; a single-item source holds at that item forever
    /// (`reached_end` is set immediately).
    pub fn new(mut source: S, input_dt: f64) -> Result<Self> {
        let n = source
            .next_item()
            .ok_or_else(|| Error::invariant("trajectory source yielded no items"))?;
        let (np1, reached_end) = match source.next_item() {
            Some(item) => (item, false),
            None => (n, true),
        };
        Ok(Self {
            source,
            input_dt,
            interpol_t: 0.0,
            n,
            np1,
            reached_end,
        })
    }

    /// Advance accumulated time by `dt`, pulling fresh items from the
    /// producer while `interpol_t` has crossed a full `input_dt` step
    /// (§4.1's `loadNew` window-slide, mirrored here on the host side).
    pub fn increment(&mut self, dt: f64) {
        if self.reached_end {
            return;
        }
        self.interpol_t += dt;
        while self.interpol_t > self.input_dt {
            self.interpol_t -= self.input_dt;
            self.n = self.np1;
            match self.source.next_item() {
                Some(item) => self.np1 = item,
                None => {
                    self.reached_end = true;
                    break;
                }
            }
        }
    }

    /// Linear interpolation between the two cached neighbours at phase
    /// `interpol_t / input_dt`, clamped to `[0, 1]` (§4.5).
    pub fn get_sample(&self) -> TrajectoryItem {
        let t = (self.interpol_t / self.input_dt).clamp(0.0, 1.0);
        TrajectoryItem::interpolate(&self.n, &self.np1, t)
    }

    /// One-shot flag set the cycle the inner producer first runs dry
    /// (§4.5 "End-of-stream").
    pub fn reached_end_of_trajectory(&self) -> bool {
        self.reached_end
    }
}

/// Wraps a base `TrajectoryItem` iterator, sub-sampling it at
/// `playback_speed` and recomputing feed-forward/PWM for the rescaled
/// velocity — the producer a `TrajectorySampler` is built over when
/// `playPath` is driven below realtime (§4.5).
///
/// `playback_speed` must be in `(0, 1.0]`; values above 1 would ask the
/// device-side `ReferenceInterpolator` to extrapolate faster than the
/// trajectory was planned for, which §4.5 explicitly rejects.
pub struct PlaybackSpeedProducer<I: Iterator<Item = TrajectoryItem>, D: JointDynamics> {
    base: I,
    dynamics: D,
    playback_speed: f64,
    playback_speed_t: f64,
    current: Option<TrajectoryItem>,
    next: Option<TrajectoryItem>,
}

impl<I: Iterator<Item = TrajectoryItem>, D: JointDynamics> PlaybackSpeedProducer<I, D> {
    pub fn new(mut base: I, dynamics: D, playback_speed: f64) -> Result<Self> {
        if playback_speed <= 0.0 || playback_speed > 1.0 {
            return Err(Error::invalid_argument(format!(
                "playback_speed must be in (0, 1.0], got {playback_speed}"
            )));
        }
        let current = base.next();
        let next = base.next();
        Ok(Self {
            base,
            dynamics,
            playback_speed,
            playback_speed_t: 0.0,
            current,
            next,
        })
    }
}

impl<I: Iterator<Item = TrajectoryItem>, D: JointDynamics> ItemSource
    for PlaybackSpeedProducer<I, D>
{
    fn next_item(&mut self) -> Option<TrajectoryItem> {
        let (current, next) = (self.current?, self.next?);

        let mut item = TrajectoryItem::interpolate(&current, &next, self.playback_speed_t);
        item.scale_velocity(self.playback_speed);
        self.dynamics.recalculate_feed_forward(&mut item);
        self.dynamics.recalc_pwm(&mut item);

        self.playback_speed_t += self.playback_speed;
        if self.playback_speed_t >= 1.0 {
            self.playback_speed_t -= 1.0;
            self.current = self.next;
            self.next = self.base.next();
        }

        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::IdentityDynamics;
    use servo_common::DOF;

    fn item(p: f64) -> TrajectoryItem {
        TrajectoryItem::at_rest([p; DOF])
    }

    #[test]
    fn rejects_playback_speed_above_one() {
        let base = vec![item(0.0), item(1.0)].into_iter();
        let result = PlaybackSpeedProducer::new(base, IdentityDynamics, 1.5);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn sampler_interpolates_linearly_between_two_points() {
        let mut points = vec![item(0.0), item(1.0)].into_iter();
        let source = move || points.next();
        let mut sampler = TrajectorySampler::new(source, 0.01).unwrap();

        sampler.increment(0.0048);
        let sample = sampler.get_sample();
        assert!((sample.p[0] - 0.48).abs() < 1e-9);
    }

    #[test]
    fn sampler_holds_last_sample_past_end_of_stream() {
        let mut points = vec![item(0.0), item(1.0)].into_iter();
        let source = move || points.next();
        let mut sampler = TrajectorySampler::new(source, 0.01).unwrap();

        for _ in 0..10 {
            sampler.increment(0.01);
        }

        assert!(sampler.reached_end_of_trajectory());
        let held = sampler.get_sample();
        sampler.increment(0.01);
        assert_eq!(sampler.get_sample(), held);
    }

    #[test]
    fn playback_speed_producer_slows_traversal() {
        let base = vec![item(0.0), item(1.0), item(2.0)].into_iter();
        let mut producer = PlaybackSpeedProducer::new(base, IdentityDynamics, 0.5).unwrap();

        // Each call reports the pre-advance phase, then steps by
        // `playback_speed`: half-speed playback takes two calls to
        // cross one base segment.
        let first = producer.next_item().unwrap();
        assert!((first.p[0] - 0.0).abs() < 1e-9);
        let second = producer.next_item().unwrap();
        assert!((second.p[0] - 0.5).abs() < 1e-9);
    }
}
