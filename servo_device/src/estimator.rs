//! Fixed-step discrete Kalman observer: position, velocity, load
//! disturbance (§4.2 `KalmanObserver`).
//!
//! A plain `{State, Gains, step}` triple, no trait, no allocation,
//! reset explicitly on mode change. The observer is a pure function of
//! its state and inputs: it never surfaces an error, matching §4.2
//! ("no error return").
//!
//! The tracking law is the steady-state g-h-k (alpha-beta-gamma) filter
//! for a constant-acceleration model, with the usual "acceleration"
//! state reinterpreted as the load-disturbance torque subtracted from
//! the known control signal (`accel = u - load_disturbance`). The g-h-k
//! gains are a closed-form function of a single damping parameter
//! `theta ∈ (0, 1)`, which is provably stable for any cycle time — the
//! literal 3x3 Kalman gain this observer nominally estimates would need
//! a genuine plant model (inertia, damping) this crate does not own
//! (§1 Non-goals), so `theta` stands in for `controlSpeed` as the
//! single tuning knob (see `DESIGN.md`).

/// The estimator's 3-state vector: `[position, velocity,
/// load_disturbance]` (§3 `EstimatorState`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EstimatorState {
    /// Estimated motor-side position [ticks]. Unwrapped — see
    /// [`unwrap_position`].
    pub position: f64,
    /// Estimated motor-side velocity [ticks/s].
    pub velocity: f64,
    /// Estimated load-disturbance torque, in the same units as the
    /// control signal `u`.
    pub load_disturbance: f64,
}

impl EstimatorState {
    /// The 3-vector `x` as `[pos, vel, loadDisturbance]`.
    pub fn x(&self) -> [f64; 3] {
        [self.position, self.velocity, self.load_disturbance]
    }
}

/// Precomputed observer gain for one `controlSpeed` setting (§4.2:
/// "gains are precomputed at compile time from a plant model and
/// indexed by `controlSpeed`").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanGains {
    /// Position correction gain (the classic g-h-k "g").
    pub g: f64,
    /// Velocity correction gain (the classic g-h-k "h").
    pub h: f64,
    /// Load-disturbance correction gain (the classic g-h-k "k").
    pub k: f64,
}

impl KalmanGains {
    /// Derive gains for `control_speed` (0..=255, §3). Maps onto a
    /// single damping parameter `theta` — larger `control_speed` gives
    /// a smaller `theta`, i.e. a more aggressive, faster-converging
    /// filter — `controlSpeed` selects into this continuum the way a
    /// compiled gain table would select a row.
    pub fn for_control_speed(control_speed: u8) -> Self {
        let s = control_speed as f64 / u8::MAX as f64;
        let theta = (0.995 - 0.9 * s).clamp(0.01, 0.999);
        Self::for_theta(theta)
    }

    fn for_theta(theta: f64) -> Self {
        Self {
            g: 1.0 - theta.powi(3),
            h: 1.5 * (1.0 - theta).powi(2) * (1.0 + theta),
            k: 0.5 * (1.0 - theta).powi(3),
        }
    }
}

/// Advance the estimator one control tick (§4.3 step 4).
///
/// `y` is the unwrapped motor position measurement [ticks]; `u` is the
/// control signal *applied last cycle* (the estimator predicts forward
/// with the input that actually drove the plant, a one-cycle delay
/// consistent with the control loop's "advance observer, then compute
/// this cycle's `u`" ordering in §4.3). `dt` is the tick period [s].
pub fn kalman_step(state: &mut EstimatorState, gains: &KalmanGains, y: f64, u: f64, dt: f64) {
    if dt <= 0.0 {
        return;
    }

    let accel = u - state.load_disturbance;
    let pos_pred = state.position + dt * state.velocity + 0.5 * dt * dt * accel;
    let vel_pred = state.velocity + dt * accel;

    let innovation = y - pos_pred;

    state.position = pos_pred + gains.g * innovation;
    state.velocity = vel_pred + (gains.h / dt) * innovation;
    state.load_disturbance -= (2.0 * gains.k / (dt * dt)) * innovation;
}

/// Correct a raw position reading for encoder wraparound against the
/// previous estimate (§4.2: "the caller is responsible for wrap
/// correction"). Adds/subtracts one revolution if the raw reading is
/// more than half a revolution away from `previous_estimate`.
pub fn unwrap_position(raw: f64, previous_estimate: f64, ticks_per_revolution: f64) -> f64 {
    let half = ticks_per_revolution / 2.0;
    let mut unwrapped = raw;
    while unwrapped - previous_estimate > half {
        unwrapped -= ticks_per_revolution;
    }
    while previous_estimate - unwrapped > half {
        unwrapped += ticks_per_revolution;
    }
    unwrapped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_is_noop_for_nonpositive_dt() {
        let mut state = EstimatorState {
            position: 1.0,
            velocity: 2.0,
            load_disturbance: 3.0,
        };
        let before = state;
        kalman_step(&mut state, &KalmanGains::for_control_speed(50), 5.0, 0.0, 0.0);
        assert_eq!(state, before);
    }

    #[test]
    fn converges_to_constant_position_measurement() {
        let gains = KalmanGains::for_control_speed(200);
        let mut state = EstimatorState::default();
        for _ in 0..500 {
            kalman_step(&mut state, &gains, 10.0, 0.0, 0.001);
        }
        assert!((state.position - 10.0).abs() < 0.1);
    }

    #[test]
    fn rejects_disturbance_torque_over_time() {
        // Constant applied torque with position held at 0 implies a
        // constant opposing load disturbance equal to the applied u.
        let gains = KalmanGains::for_control_speed(120);
        let mut state = EstimatorState::default();
        for _ in 0..5000 {
            kalman_step(&mut state, &gains, 0.0, 3.0, 0.001);
        }
        assert!((state.load_disturbance - 3.0).abs() < 0.1);
    }

    #[test]
    fn higher_control_speed_converges_faster() {
        let slow = KalmanGains::for_control_speed(10);
        let fast = KalmanGains::for_control_speed(250);
        let mut slow_state = EstimatorState::default();
        let mut fast_state = EstimatorState::default();
        for _ in 0..20 {
            kalman_step(&mut slow_state, &slow, 10.0, 0.0, 0.001);
            kalman_step(&mut fast_state, &fast, 10.0, 0.0, 0.001);
        }
        assert!((fast_state.position - 10.0).abs() < (slow_state.position - 10.0).abs());
    }

    #[test]
    fn unwrap_position_adds_revolution_when_raw_wrapped_low() {
        let out = unwrap_position(1.0, 4095.0, 4096.0);
        assert!((out - 4097.0).abs() < 1e-9);
    }

    #[test]
    fn unwrap_position_subtracts_revolution_when_raw_wrapped_high() {
        let out = unwrap_position(4095.0, 1.0, 4096.0);
        assert!((out - (-1.0)).abs() < 1e-9);
    }

    #[test]
    fn unwrap_position_is_noop_within_half_revolution() {
        let out = unwrap_position(100.0, 90.0, 4096.0);
        assert!((out - 100.0).abs() < 1e-9);
    }
}
