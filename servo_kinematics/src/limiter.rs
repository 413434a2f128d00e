//! Velocity and path-deviation limiters used by the path builder to size
//! moves and decide when to subdivide a segment (§4.7).
//!
//! The deviation limiters follow the design note's suggested capability
//! interface (`limitAt`/`deviationOf`) rather than a trait object per
//! limiter *shape* — a small, closed set of two concrete limiters
//! (joint-space, Cartesian-space) behind one trait, no dynamic dispatch
//! needed at the call sites that matter.

use servo_common::DOF;

/// One velocity constraint: motion along `direction` (not required to be
/// unit-length; normalised internally) may not exceed `magnitude`.
#[derive(Debug, Clone, Copy)]
pub struct VelocityConstraint {
    /// Maximum speed along `direction` [SI units/s].
    pub magnitude: f64,
    /// The constrained direction (normalised on construction).
    direction: [f64; DOF],
}

impl VelocityConstraint {
    /// Construct a constraint, normalising `direction`. Panics if
    /// `direction` is the zero vector — a programmer error, not a
    /// runtime condition (no path builder should ever construct one).
    pub fn new(magnitude: f64, direction: [f64; DOF]) -> Self {
        let norm = direction.iter().map(|d| d * d).sum::<f64>().sqrt();
        assert!(norm > 0.0, "velocity constraint direction must be nonzero");
        let mut unit = direction;
        for d in &mut unit {
            *d /= norm;
        }
        Self {
            magnitude,
            direction: unit,
        }
    }

    /// The speed limit this constraint implies for motion along `unit`
    /// (assumed already normalised). Unconstrained (`f64::INFINITY`)
    /// when the motion direction is orthogonal to this constraint.
    fn projected_limit(&self, unit: &[f64; DOF]) -> f64 {
        let cos = self
            .direction
            .iter()
            .zip(unit)
            .map(|(a, b)| a * b)
            .sum::<f64>()
            .abs();
        if cos <= f64::EPSILON {
            f64::INFINITY
        } else {
            self.magnitude / cos
        }
    }
}

/// A set of velocity constraints combined as the minimum of each
/// constraint's projected limit along the requested motion direction
/// (§4.7).
#[derive(Debug, Clone, Default)]
pub struct VelocityLimiter {
    constraints: Vec<VelocityConstraint>,
}

impl VelocityLimiter {
    /// An empty limiter (no constraints — unbounded speed).
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the constraint set.
    pub fn add(&mut self, magnitude: f64, direction: [f64; DOF]) -> &mut Self {
        self.constraints.push(VelocityConstraint::new(magnitude, direction));
        self
    }

    /// The maximum speed permitted along `direction`, the minimum over
    /// all constraints' projected limits. `f64::INFINITY` if no
    /// constraint applies.
    pub fn limit_along(&self, direction: [f64; DOF]) -> f64 {
        let norm = direction.iter().map(|d| d * d).sum::<f64>().sqrt();
        if norm <= f64::EPSILON {
            return f64::INFINITY;
        }
        let mut unit = direction;
        for d in &mut unit {
            *d /= norm;
        }
        self.constraints
            .iter()
            .map(|c| c.projected_limit(&unit))
            .fold(f64::INFINITY, f64::min)
    }
}

/// Capability interface for path-deviation limiters (§9 design note):
/// how far the actual interpolated midpoint of a segment may stray from
/// the planned straight line before the path builder must subdivide.
pub trait DeviationLimiter<T> {
    /// Deviation between the planned segment's midpoint and the actual
    /// interpolated midpoint, in this limiter's native metric.
    fn deviation_of(&self, planned_midpoint: &T, actual_midpoint: &T) -> f64;

    /// The maximum deviation this limiter allows before the path
    /// builder must subdivide the segment.
    fn limit(&self) -> f64;

    /// Whether the measured deviation exceeds `limit()` and the segment
    /// must be subdivided.
    fn exceeds(&self, planned_midpoint: &T, actual_midpoint: &T) -> bool {
        self.deviation_of(planned_midpoint, actual_midpoint) > self.limit()
    }
}

/// Caps per-joint deviation (infinity-norm: the worst single joint)
/// between a planned segment and its actual interpolation.
#[derive(Debug, Clone, Copy)]
pub struct JointSpaceDeviationLimiter {
    max_deviation: f64,
}

impl JointSpaceDeviationLimiter {
    /// A limiter that rejects any deviation above `max_deviation` [SI
    /// units].
    pub fn new(max_deviation: f64) -> Self {
        Self { max_deviation }
    }

    /// A limiter whose `limit()` is `f64::INFINITY` — effectively
    /// disables subdivision (§4.7).
    pub fn max() -> Self {
        Self {
            max_deviation: f64::INFINITY,
        }
    }
}

impl DeviationLimiter<[f64; DOF]> for JointSpaceDeviationLimiter {
    fn deviation_of(&self, planned_midpoint: &[f64; DOF], actual_midpoint: &[f64; DOF]) -> f64 {
        planned_midpoint
            .iter()
            .zip(actual_midpoint)
            .map(|(p, a)| (p - a).abs())
            .fold(0.0, f64::max)
    }

    fn limit(&self) -> f64 {
        self.max_deviation
    }
}

/// Caps Cartesian (task-space) deviation — the Euclidean distance
/// between a planned segment's midpoint and its actual interpolation —
/// a.k.a. chord error.
#[derive(Debug, Clone, Copy)]
pub struct CartesianSpaceDeviationLimiter {
    max_deviation: f64,
}

impl CartesianSpaceDeviationLimiter {
    /// A limiter that rejects any chord error above `max_deviation` [m].
    pub fn new(max_deviation: f64) -> Self {
        Self { max_deviation }
    }

    /// A limiter whose `limit()` is `f64::INFINITY` — effectively
    /// disables subdivision (§4.7).
    pub fn max() -> Self {
        Self {
            max_deviation: f64::INFINITY,
        }
    }
}

impl DeviationLimiter<[f64; DOF]> for CartesianSpaceDeviationLimiter {
    fn deviation_of(&self, planned_midpoint: &[f64; DOF], actual_midpoint: &[f64; DOF]) -> f64 {
        planned_midpoint
            .iter()
            .zip(actual_midpoint)
            .map(|(p, a)| (p - a).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    fn limit(&self) -> f64 {
        self.max_deviation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_axis_constraint_limits_along_that_axis() {
        let mut limiter = VelocityLimiter::new();
        let mut dir = [0.0; DOF];
        dir[0] = 1.0;
        limiter.add(2.0, dir);

        assert!((limiter.limit_along(dir) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn orthogonal_direction_is_unconstrained() {
        let mut limiter = VelocityLimiter::new();
        let mut dir = [0.0; DOF];
        dir[0] = 1.0;
        limiter.add(2.0, dir);

        let mut orthogonal = [0.0; DOF];
        orthogonal[1] = 1.0;
        assert_eq!(limiter.limit_along(orthogonal), f64::INFINITY);
    }

    #[test]
    fn combined_limit_is_minimum_across_constraints() {
        let mut limiter = VelocityLimiter::new();
        let mut dir = [0.0; DOF];
        dir[0] = 1.0;
        limiter.add(5.0, dir);
        limiter.add(1.0, dir);

        assert!((limiter.limit_along(dir) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn joint_space_limiter_uses_infinity_norm() {
        let limiter = JointSpaceDeviationLimiter::new(0.5);
        let planned = [0.0; DOF];
        let mut actual = [0.0; DOF];
        actual[3] = 0.6;
        assert!(limiter.exceeds(&planned, &actual));
    }

    #[test]
    fn max_limiter_never_exceeds() {
        let limiter = JointSpaceDeviationLimiter::max();
        let planned = [0.0; DOF];
        let actual = [1e6; DOF];
        assert!(!limiter.exceeds(&planned, &actual));
    }

    #[test]
    fn cartesian_limiter_uses_euclidean_norm() {
        let limiter = CartesianSpaceDeviationLimiter::new(1.0);
        let planned = [0.0; DOF];
        let mut actual = [0.0; DOF];
        actual[0] = 0.6;
        actual[1] = 0.8;
        // sqrt(0.36 + 0.64) == 1.0, right at the boundary: not exceeded.
        assert!(!limiter.exceeds(&planned, &actual));
        actual[0] = 0.7;
        assert!(limiter.exceeds(&planned, &actual));
    }
}
