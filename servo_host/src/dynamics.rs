//! External dynamics/feed-forward collaborator boundary (§4.5: producer
//! "recomputes feed-forward (`dynamics.recalculateFreedForward`) and
//! PWM (`dynamics.recalcPwm`) for the scaled velocity"). Out of scope
//! per §1 Non-goals (inverse dynamics modelling); this crate only
//! specifies the trait a playback-speed sub-interpolator calls into.

use servo_common::trajectory::TrajectoryItem;

/// Recomputes feed-forward and PWM terms of a trajectory item once its
/// velocity has been rescaled by a playback speed factor other than 1.0.
pub trait JointDynamics: Send {
    /// Recompute `item.u`'s feed-forward component in place for the
    /// rescaled `item.v`.
    fn recalculate_feed_forward(&self, item: &mut TrajectoryItem);

    /// Recompute the PWM command implied by `item.u` and `item.v`.
    fn recalc_pwm(&self, item: &mut TrajectoryItem);
}

/// A `JointDynamics` that leaves feed-forward and PWM untouched. Used
/// wherever no concrete inverse-dynamics model is wired in — playback
/// at unity speed never needs rescaling, and tests exercise the
/// sampler without a real dynamics collaborator.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityDynamics;

impl JointDynamics for IdentityDynamics {
    fn recalculate_feed_forward(&self, _item: &mut TrajectoryItem) {}

    fn recalc_pwm(&self, _item: &mut TrajectoryItem) {}
}
