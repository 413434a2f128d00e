//! Device-side control: reference interpolation, state estimation, and
//! the state-feedback servo control loop that runs once per control
//! tick on the microcontroller (§4.1–§4.3).
//!
//! # Module Structure
//!
//! - [`interpolator`] - [`interpolator::ReferenceInterpolator`], host→device reference smoothing
//! - [`estimator`] - [`estimator::EstimatorState`], the Kalman-style position/velocity/load observer
//! - [`encoder`] - [`encoder::EncoderSource`]/[`encoder::CurrentSink`], the hardware capability traits
//! - [`control_loop`] - [`ServoControlLoop`], the per-joint control law and state machine
//! - [`rt`] - [`rt::DeviceRuntime`], the fixed-cadence cycle runner

pub mod control_loop;
pub mod encoder;
pub mod estimator;
pub mod interpolator;
pub mod rt;

pub use control_loop::{
    backlash_gain_for_speed, ControlGains, ControlState, ServoControlLoop, ServoControlLoopConfig,
};
pub use encoder::{CurrentSink, EncoderSource, OpticalEncoderDiagnostic};
pub use estimator::{kalman_step, unwrap_position, EstimatorState, KalmanGains};
pub use interpolator::ReferenceInterpolator;
pub use rt::{rt_setup, DeviceRuntime, RtError};
