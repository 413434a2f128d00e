//! State-feedback servo control loop with dual-encoder backlash
//! compensation (§4.3 `ServoControlLoop`).
//!
//! Runs to completion once per control tick; the caller (a hardware
//! timer ISR in firmware, or [`crate::rt`] off-MCU) is responsible for
//! invoking [`ServoControlLoop::tick`] at the configured cadence. No
//! suspension points inside a tick, per §5's single-threaded
//! cooperative model.

use servo_common::ReferenceTriplet;
use tracing::{debug, info, warn};

use crate::encoder::{CurrentSink, EncoderSource, OpticalEncoderDiagnostic};
use crate::estimator::{kalman_step, unwrap_position, EstimatorState, KalmanGains};
use crate::interpolator::ReferenceInterpolator;

/// State-feedback gains `L[0..=3]` (§3 `EstimatorState`: "Gain matrix
/// `L ∈ ℝ⁵`" — `L[4]`, the backlash gain, is selected separately by
/// [`backlash_gain_for_speed`] since it is indexed by a distinct
/// `backlashControlSpeed` byte).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlGains {
    /// `L[0]`: position-loop proportional gain.
    pub l0: f64,
    /// `L[1]`: velocity-loop proportional gain.
    pub l1: f64,
    /// `L[2]`: velocity-loop integral gain.
    pub l2: f64,
    /// `L[3]`: anti-windup back-calculation gain.
    pub l3: f64,
}

impl ControlGains {
    /// Derive gains for `control_speed` (0..=255, §3), the same
    /// analytic stand-in for a compiled table used by
    /// [`KalmanGains::for_control_speed`] — see `DESIGN.md`.
    pub fn for_control_speed(control_speed: u8) -> Self {
        let s = control_speed as f64 / u8::MAX as f64;
        Self {
            l0: 2.0 + 38.0 * s,
            l1: 0.05 + 0.45 * s,
            l2: 0.5 + 9.5 * s,
            l3: 0.1 + 0.9 * s,
        }
    }
}

/// `L[4]`: the backlash-compensation integral gain, selected by
/// `backlashControlSpeed` (§3). Kept below 0.3 across the whole input
/// range so the geometric convergence of `outputPosOffset` (§8
/// scenario 6) stays comfortably stable regardless of tick rate.
pub fn backlash_gain_for_speed(backlash_control_speed: u8) -> f64 {
    let s = backlash_control_speed as f64 / u8::MAX as f64;
    0.01 + 0.29 * s
}

/// The controller's operating mode (§3 `ServoControllerState`
/// lifecycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    /// Output forced to zero; Kalman observer still tracks position
    /// for telemetry, but the PID/backlash law does not run.
    Disabled,
    /// Bypasses the reference/estimator/PID pipeline; dispatches a
    /// caller-set raw current or PWM signal directly (hardware test
    /// modes, §6 CLI surface).
    OpenLoop,
    /// Full state-feedback control against the main encoder only.
    ClosedLoopMainOnly,
    /// Full state-feedback control plus output-shaft backlash
    /// compensation (§4.3 step 10).
    ClosedLoopWithBacklash,
}

/// Static construction parameters for one joint's control loop.
#[derive(Debug, Clone, Copy)]
pub struct ServoControlLoopConfig {
    /// Selects the Kalman/state-feedback gain set (§3).
    pub control_speed: u8,
    /// Selects the backlash-compensation gain (§3).
    pub backlash_control_speed: u8,
    /// Control-tick period [s] (matches `getTimeInterval`, §3).
    pub dt_s: f64,
    /// Symmetric clamp applied to the raw control signal before
    /// dispatch to the `CurrentSink` (§4.3 step 11).
    pub u_limit: f64,
    /// Encoder ticks per mechanical revolution, used for unwrapping
    /// (§4.2).
    pub ticks_per_revolution: f64,
    /// `loadNew` must arrive within this multiple of
    /// `loadTimeInterval` or the interpolator is forced to hold
    /// (§4.1 Failure, §4.3 watchdog).
    pub stale_hold_multiple: u32,
    /// `loadNew` silence beyond this multiple of `loadTimeInterval`
    /// disables the controller outright (§4.3 watchdog).
    pub stale_disable_multiple: u32,
}

/// The per-joint control loop: owns its encoders, current sink,
/// reference interpolator, and Kalman observer, and executes one full
/// control-law pass per [`Self::tick`] call (§4.3).
pub struct ServoControlLoop {
    main_encoder: Box<dyn EncoderSource>,
    output_encoder: Option<Box<dyn EncoderSource>>,
    current_sink: Box<dyn CurrentSink>,

    interpolator: ReferenceInterpolator,
    estimator: EstimatorState,
    kalman_gains: KalmanGains,
    control_gains: ControlGains,
    backlash_gain: f64,

    state: ControlState,
    only_use_main_encoder: bool,
    pwm_open_loop: bool,
    open_loop_signal: i16,

    raw_main_pos: f64,
    raw_output_pos: f64,
    output_pos_offset: f64,
    initial_output_pos_offset: f64,

    i_vel: f64,
    last_control_signal: f64,
    last_control_error: f64,
    current: i16,
    pwm_control_signal: i16,
    u_limit_diff: f64,

    u_limit: f64,
    dt_s: f64,
    ticks_per_revolution: f64,
    stale_hold_multiple: u32,
    stale_disable_multiple: u32,

    stale_disables: u64,
}

impl ServoControlLoop {
    /// Construct a controller in the `Disabled` state. `output_encoder
    /// = None` permanently restricts this joint to `ClosedLoopMainOnly`
    /// (single-encoder joints, §4.3: "onlyUseMainEncoder").
    pub fn new(
        config: ServoControlLoopConfig,
        main_encoder: Box<dyn EncoderSource>,
        output_encoder: Option<Box<dyn EncoderSource>>,
        current_sink: Box<dyn CurrentSink>,
    ) -> Self {
        let mut main_encoder = main_encoder;
        main_encoder.init();
        let mut output_encoder = output_encoder;
        if let Some(enc) = output_encoder.as_mut() {
            enc.init();
        }

        Self {
            main_encoder,
            output_encoder,
            current_sink,
            interpolator: ReferenceInterpolator::new(
                servo_common::consts::LOAD_TIME_INTERVAL_US_DEFAULT,
                servo_common::consts::GET_TIME_INTERVAL_US_DEFAULT,
            ),
            estimator: EstimatorState::default(),
            kalman_gains: KalmanGains::for_control_speed(config.control_speed),
            control_gains: ControlGains::for_control_speed(config.control_speed),
            backlash_gain: backlash_gain_for_speed(config.backlash_control_speed),
            state: ControlState::Disabled,
            only_use_main_encoder: false,
            pwm_open_loop: false,
            open_loop_signal: 0,
            raw_main_pos: 0.0,
            raw_output_pos: 0.0,
            output_pos_offset: 0.0,
            initial_output_pos_offset: 0.0,
            i_vel: 0.0,
            last_control_signal: 0.0,
            last_control_error: 0.0,
            current: 0,
            pwm_control_signal: 0,
            u_limit_diff: 0.0,
            u_limit: config.u_limit,
            dt_s: config.dt_s,
            ticks_per_revolution: config.ticks_per_revolution,
            stale_hold_multiple: config.stale_hold_multiple,
            stale_disable_multiple: config.stale_disable_multiple,
            stale_disables: 0,
        }
    }

    fn wants_backlash(&self) -> bool {
        self.output_encoder.is_some() && !self.only_use_main_encoder
    }

    /// Enable or disable closed-loop control (§4.3 state machine).
    /// Entering from `Disabled` re-seeds the backlash offset from a
    /// fresh encoder read and resets the integrator, anti-windup term,
    /// and interpolator timing — the bumpless-handover contract (§8).
    pub fn enable(&mut self, on: bool) {
        if on {
            if self.state == ControlState::Disabled {
                self.enter_active();
            }
            self.state = if self.wants_backlash() {
                ControlState::ClosedLoopWithBacklash
            } else {
                ControlState::ClosedLoopMainOnly
            };
            info!(state = ?self.state, "servo control loop enabled");
        } else if self.state != ControlState::Disabled {
            self.current_sink.zero();
            self.last_control_signal = 0.0;
            self.state = ControlState::Disabled;
            info!("servo control loop disabled");
        }
    }

    /// Toggle the hardware open-loop test mode (§6 CLI surface:
    /// `recordOpticalEncoderData`/`recordCurrentAndPwmBehaviour`).
    /// `pwm_mode` selects whether the dispatched value is a raw PWM
    /// duty cycle or a target current.
    pub fn open_loop_mode(&mut self, enable: bool, pwm_mode: bool) {
        self.pwm_open_loop = pwm_mode;
        if enable {
            if self.state == ControlState::Disabled {
                self.enter_active();
            }
            self.state = ControlState::OpenLoop;
        } else if self.state == ControlState::OpenLoop {
            self.state = if self.wants_backlash() {
                ControlState::ClosedLoopWithBacklash
            } else {
                ControlState::ClosedLoopMainOnly
            };
        }
    }

    /// Set the raw open-loop signal and, if `active`, ensure the
    /// controller is in `OpenLoop` mode (mirrors the firmware's
    /// `setOpenLoopControlSignal(pwm, active)`).
    pub fn set_open_loop_control_signal(&mut self, value: i16, active: bool) {
        self.open_loop_signal = value;
        if active && self.state != ControlState::OpenLoop {
            self.open_loop_mode(true, self.pwm_open_loop);
        } else if !active && self.state == ControlState::OpenLoop {
            self.open_loop_mode(false, self.pwm_open_loop);
        }
    }

    /// Restrict control to the main encoder even when an output
    /// encoder is present (§3 `onlyUseMainEncoder`), re-deriving the
    /// active closed-loop variant if currently enabled.
    pub fn set_only_use_main_encoder(&mut self, only_main: bool) {
        self.only_use_main_encoder = only_main;
        match self.state {
            ControlState::ClosedLoopMainOnly | ControlState::ClosedLoopWithBacklash => {
                self.state = if self.wants_backlash() {
                    ControlState::ClosedLoopWithBacklash
                } else {
                    ControlState::ClosedLoopMainOnly
                };
            }
            _ => {}
        }
    }

    fn enter_active(&mut self) {
        self.main_encoder.trigger_sample();
        self.raw_main_pos = unwrap_position(
            self.main_encoder.get_value(),
            self.estimator.position,
            self.ticks_per_revolution,
        );
        if let Some(enc) = self.output_encoder.as_mut() {
            enc.trigger_sample();
            self.raw_output_pos = enc.get_value();
        }
        self.initial_output_pos_offset = self.raw_output_pos - self.raw_main_pos;
        self.output_pos_offset = self.initial_output_pos_offset;
        self.i_vel = 0.0;
        self.u_limit_diff = 0.0;
        self.interpolator.reset_timing();
    }

    /// Feed a freshly arrived host reference into the interpolator
    /// (§4.1 `loadNew`, delivered here from the wire parser).
    pub fn load_new_reference(&mut self, now_us: u64, triplet: ReferenceTriplet) {
        self.interpolator.load_new(now_us, triplet);
    }

    fn apply_watchdog(&mut self, now_us: u64) {
        if self.interpolator.is_stale(now_us, self.stale_disable_multiple) {
            if self.state != ControlState::Disabled {
                self.stale_disables += 1;
                warn!(
                    now_us,
                    stale_disables = self.stale_disables,
                    "reference stream stale beyond disable threshold, disabling"
                );
                self.enable(false);
            }
        } else if self.interpolator.is_stale(now_us, self.stale_hold_multiple) {
            self.interpolator.reset_timing();
        }
    }

    /// Run one control-tick pass (§4.3, steps 1-12). Must be called at
    /// the configured `dt_s` cadence by the ISR/timer driving this
    /// loop.
    pub fn tick(&mut self, now_us: u64) {
        self.main_encoder.trigger_sample();
        self.raw_main_pos = unwrap_position(
            self.main_encoder.get_value(),
            self.estimator.position,
            self.ticks_per_revolution,
        );

        let backlash_active = self.state == ControlState::ClosedLoopWithBacklash;
        if let Some(enc) = self.output_encoder.as_mut() {
            if backlash_active || !self.only_use_main_encoder {
                enc.trigger_sample();
                self.raw_output_pos = enc.get_value();
            }
        }

        self.apply_watchdog(now_us);
        self.interpolator.update_timing(now_us);
        let reference = self.interpolator.get_next();

        let control_signal_input = match self.state {
            ControlState::ClosedLoopMainOnly | ControlState::ClosedLoopWithBacklash => {
                self.last_control_signal
            }
            ControlState::Disabled | ControlState::OpenLoop => 0.0,
        };
        kalman_step(
            &mut self.estimator,
            &self.kalman_gains,
            self.raw_main_pos,
            control_signal_input,
            self.dt_s,
        );

        match self.state {
            ControlState::Disabled => {
                self.current_sink.zero();
                self.current = 0;
                self.last_control_signal = 0.0;
            }
            ControlState::OpenLoop => {
                if self.pwm_open_loop {
                    self.current_sink.set_pwm(self.open_loop_signal);
                    self.pwm_control_signal = self.open_loop_signal;
                } else {
                    self.current_sink.set_target_current(self.open_loop_signal);
                    self.current = self.open_loop_signal;
                }
            }
            ControlState::ClosedLoopMainOnly | ControlState::ClosedLoopWithBacklash => {
                if backlash_active {
                    self.output_pos_offset += self.backlash_gain
                        * (self.raw_output_pos - self.raw_main_pos - self.output_pos_offset);
                }

                let effective_ref_pos = reference.position as f64
                    + if backlash_active {
                        self.output_pos_offset
                    } else {
                        0.0
                    };

                let e = effective_ref_pos - self.estimator.position;
                let v_set = reference.velocity as f64 + self.control_gains.l0 * e;
                let e_v = v_set - self.estimator.velocity;

                self.i_vel +=
                    (self.control_gains.l2 * e_v - self.control_gains.l3 * self.u_limit_diff)
                        * self.dt_s;

                let u_raw = reference.feed_forward as f64
                    + self.control_gains.l1 * e_v
                    + self.i_vel
                    - self.estimator.load_disturbance;
                let u_clamped = u_raw.clamp(-self.u_limit, self.u_limit);
                self.u_limit_diff = u_clamped - u_raw;

                self.last_control_signal = u_clamped;
                self.last_control_error = e;
                self.current = clamp_to_i16(u_clamped);
                self.current_sink.set_target_current(self.current);

                debug!(
                    position = self.estimator.position,
                    error = e,
                    u = u_clamped,
                    "servo control tick"
                );
            }
        }
    }

    /// Current Kalman position estimate [ticks] (§4.4: what the host's
    /// `getPosition` ultimately reads back).
    pub fn position(&self) -> f64 {
        self.estimator.position
    }

    /// Current Kalman velocity estimate, clamped to the wire's `i16`
    /// range.
    pub fn velocity(&self) -> i16 {
        clamp_to_i16(self.estimator.velocity)
    }

    /// Position error from the most recently executed closed-loop
    /// tick (0 while disabled/open-loop).
    pub fn control_error(&self) -> f64 {
        self.last_control_error
    }

    /// Last target current dispatched to the `CurrentSink`.
    pub fn current(&self) -> i16 {
        self.current
    }

    /// Last raw control signal `u`, clamped to `i16`.
    pub fn control_signal(&self) -> i16 {
        clamp_to_i16(self.last_control_signal)
    }

    /// Last raw PWM duty cycle dispatched in open-loop PWM mode.
    pub fn pwm_control_signal(&self) -> i16 {
        self.pwm_control_signal
    }

    /// The accumulated backlash compensation offset (§4.3 step 10).
    pub fn backlash_compensation(&self) -> f64 {
        self.output_pos_offset
    }

    /// The unfiltered main-encoder reading from the most recent tick.
    pub fn main_encoder_position(&self) -> f64 {
        self.raw_main_pos
    }

    /// Optional diagnostic payload from the main encoder (§9: only the
    /// optical variant returns `Some`).
    pub fn main_encoder_diagnostic(&self) -> Option<OpticalEncoderDiagnostic> {
        self.main_encoder.get_diagnostic()
    }

    /// Whether the controller is in any non-`Disabled` state.
    pub fn is_enabled(&self) -> bool {
        self.state != ControlState::Disabled
    }

    /// The controller's current state (§3 lifecycle).
    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Number of times the watchdog has force-disabled this
    /// controller due to a stale reference stream.
    pub fn stale_disable_count(&self) -> u64 {
        self.stale_disables
    }
}

#[inline]
fn clamp_to_i16(v: f64) -> i16 {
    v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::simulated::{OffsetEncoder, RecordingCurrentSink};

    /// An encoder that always reads a fixed, caller-set value —
    /// useful for driving the control law with a known constant error.
    #[derive(Debug, Clone, Copy, Default)]
    struct FixedEncoder(f64);

    impl EncoderSource for FixedEncoder {
        fn trigger_sample(&mut self) {}
        fn get_value(&self) -> f64 {
            self.0
        }
    }

    fn config() -> ServoControlLoopConfig {
        ServoControlLoopConfig {
            control_speed: 50,
            backlash_control_speed: 40,
            dt_s: 0.0012,
            u_limit: 1000.0,
            ticks_per_revolution: 4096.0,
            stale_hold_multiple: 2,
            stale_disable_multiple: 3,
        }
    }

    fn build(cfg: ServoControlLoopConfig) -> ServoControlLoop {
        ServoControlLoop::new(
            cfg,
            Box::new(FixedEncoder(0.0)),
            None,
            Box::new(RecordingCurrentSink::default()),
        )
    }

    #[test]
    fn disabled_zeroes_output() {
        let mut servo = build(config());
        servo.tick(1_000);
        assert_eq!(servo.current(), 0);
        assert_eq!(servo.state(), ControlState::Disabled);
    }

    #[test]
    fn bumpless_enable_keeps_control_signal_small() {
        let mut servo = build(config());
        // Reference already at the current (zero) position.
        servo.load_new_reference(0, ReferenceTriplet::hold(0.0));
        servo.load_new_reference(12_000, ReferenceTriplet::hold(0.0));
        servo.enable(true);
        servo.tick(12_000);
        assert!(servo.control_signal().abs() <= 5);
    }

    #[test]
    fn open_loop_dispatches_raw_signal_without_running_pid() {
        let mut servo = build(config());
        servo.open_loop_mode(true, false);
        servo.set_open_loop_control_signal(321, true);
        servo.tick(1_000);
        assert_eq!(servo.current(), 321);
    }

    #[test]
    fn open_loop_pwm_mode_dispatches_pwm() {
        let mut servo = build(config());
        servo.open_loop_mode(true, true);
        servo.set_open_loop_control_signal(77, true);
        servo.tick(1_000);
        assert_eq!(servo.pwm_control_signal(), 77);
    }

    #[test]
    fn anti_windup_bounds_integral_under_sustained_saturation() {
        let mut cfg = config();
        cfg.u_limit = 0.5; // tiny clamp, easy to saturate.
        let mut servo = build(cfg);
        // Reference far away from the fixed-at-zero encoder, forcing
        // sustained saturation every single tick.
        servo.load_new_reference(0, ReferenceTriplet::hold(10_000.0));
        servo.load_new_reference(12_000, ReferenceTriplet::hold(10_000.0));
        servo.enable(true);

        let mut now = 12_000u64;
        for _ in 0..2_000 {
            now += 1_200;
            servo.tick(now);
        }
        // With anti-windup engaged the integrator settles near a
        // bounded value rather than growing without limit — far below
        // what unconstrained integration over 2000 cycles would reach.
        assert!(servo.i_vel.abs() < 10_000.0, "Ivel grew unbounded: {}", servo.i_vel);
    }

    #[test]
    fn backlash_offset_converges_to_constant_shaft_gap() {
        let mut cfg = config();
        cfg.backlash_control_speed = 255; // fastest convergence
        let gap = 25.0;
        let servo_cfg = cfg;
        let mut servo = ServoControlLoop::new(
            servo_cfg,
            Box::new(FixedEncoder(0.0)),
            Some(Box::new(OffsetEncoder::new(gap))),
            Box::new(RecordingCurrentSink::default()),
        );
        servo.load_new_reference(0, ReferenceTriplet::hold(0.0));
        servo.load_new_reference(12_000, ReferenceTriplet::hold(0.0));
        servo.enable(true);
        assert_eq!(servo.state(), ControlState::ClosedLoopWithBacklash);

        let mut now = 12_000u64;
        for _ in 0..500 {
            now += 1_200;
            servo.tick(now);
        }
        assert!(
            (servo.backlash_compensation() - gap).abs() < 0.1,
            "offset {} did not converge to {gap}",
            servo.backlash_compensation()
        );
    }

    #[test]
    fn watchdog_disables_after_sustained_silence() {
        let mut servo = build(config());
        servo.load_new_reference(0, ReferenceTriplet::hold(0.0));
        servo.load_new_reference(12_000, ReferenceTriplet::hold(0.0));
        servo.enable(true);

        // Beyond 3 * 12ms = 36ms of silence since the last load.
        servo.tick(12_000 + 40_000);
        assert_eq!(servo.state(), ControlState::Disabled);
        assert_eq!(servo.stale_disable_count(), 1);
    }

    #[test]
    fn only_main_encoder_suppresses_backlash_state() {
        let mut servo = ServoControlLoop::new(
            config(),
            Box::new(FixedEncoder(0.0)),
            Some(Box::new(OffsetEncoder::new(10.0))),
            Box::new(RecordingCurrentSink::default()),
        );
        servo.set_only_use_main_encoder(true);
        servo.enable(true);
        assert_eq!(servo.state(), ControlState::ClosedLoopMainOnly);
    }
}
