//! Joint↔Cartesian coordinate types and path-building limiters (§4.7).
//!
//! `PoseTransform` (forward/inverse kinematics) is the black-box
//! collaborator named in §1's Non-goals — this crate only defines the
//! trait boundary and the value types either side of it.

pub mod coordinate;
pub mod limiter;

pub use coordinate::{CartesianCoordinate, JointSpaceCoordinate, KinematicsError, PoseTransform};
pub use limiter::{
    CartesianSpaceDeviationLimiter, DeviationLimiter, JointSpaceDeviationLimiter, VelocityLimiter,
};
