//! Host-side trajectory playback: per-joint communication, lazy
//! trajectory sampling, and the fixed-cycle scheduler that ties them
//! together (§4.4–§4.6).
//!
//! # Module Structure
//!
//! - [`communicator`] - [`communicator::JointCommunicator`], the per-joint send/recv state machine
//! - [`dynamics`] - [`dynamics::JointDynamics`], the external feed-forward/PWM recompute boundary
//! - [`sampler`] - [`sampler::TrajectorySampler`]/[`sampler::PlaybackSpeedProducer`], lazy trajectory interpolation
//! - [`scheduler`] - [`scheduler::RobotScheduler`], the worker-thread cycle dispatcher

pub mod communicator;
pub mod dynamics;
pub mod sampler;
pub mod scheduler;

pub use communicator::{HandshakeState, JointCommunicator, OpticalEncoderChannelData};
pub use dynamics::{IdentityDynamics, JointDynamics};
pub use sampler::{ItemSource, PlaybackSpeedProducer, TrajectorySampler};
pub use scheduler::{JointsView, RobotScheduler, RunningScheduler, SchedulerControl};
