//! Joint-space and Cartesian-space coordinate types, and the
//! `PoseTransform` trait boundary to the external FK/IK collaborator
//! (§4.7, §1 Non-goals).

use servo_common::DOF;
use thiserror::Error;

/// A pose expressed in joint space: one angle/extension per joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointSpaceCoordinate {
    /// Joint values [SI units — rad for revolute, m for prismatic].
    pub q: [f64; DOF],
}

impl JointSpaceCoordinate {
    /// Construct from a raw joint vector.
    pub fn new(q: [f64; DOF]) -> Self {
        Self { q }
    }
}

/// A pose expressed in Cartesian task space (position + orientation,
/// flattened to a 6-vector for a 6-DOF arm: 3 translation + 3 rotation).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CartesianCoordinate {
    /// `[x, y, z, rx, ry, rz]` in SI units (m, rad).
    pub c: [f64; DOF],
}

impl CartesianCoordinate {
    /// Construct from a raw Cartesian vector.
    pub fn new(c: [f64; DOF]) -> Self {
        Self { c }
    }
}

/// Kinematics failure: the external solver could not produce a joint
/// solution for the requested pose.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KinematicsError {
    /// Inverse kinematics: no joint configuration reaches this pose.
    #[error("pose unreachable: {0}")]
    Unreachable(String),
}

/// Forward/inverse kinematics collaborator (§1 Non-goals: "kinematics/IK
/// (black-box `PoseTransform`)"). An implementation encodes the robot's
/// link geometry; this crate only specifies the boundary.
pub trait PoseTransform {
    /// Forward kinematics: joint space → Cartesian space. Total — every
    /// joint vector maps to some pose.
    fn forward(&self, joints: &JointSpaceCoordinate) -> CartesianCoordinate;

    /// Inverse kinematics: Cartesian space → joint space, seeded by a
    /// prior joint solution for branch selection. Partial — may fail
    /// with [`KinematicsError::Unreachable`].
    fn inverse(
        &self,
        pose: &CartesianCoordinate,
        seed: &JointSpaceCoordinate,
    ) -> Result<JointSpaceCoordinate, KinematicsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Identity transform used only to exercise the trait boundary in
    /// tests — treats joint values as already being Cartesian.
    struct IdentityTransform;

    impl PoseTransform for IdentityTransform {
        fn forward(&self, joints: &JointSpaceCoordinate) -> CartesianCoordinate {
            CartesianCoordinate::new(joints.q)
        }

        fn inverse(
            &self,
            pose: &CartesianCoordinate,
            _seed: &JointSpaceCoordinate,
        ) -> Result<JointSpaceCoordinate, KinematicsError> {
            if pose.c.iter().any(|v| !v.is_finite()) {
                return Err(KinematicsError::Unreachable("non-finite pose".to_string()));
            }
            Ok(JointSpaceCoordinate::new(pose.c))
        }
    }

    #[test]
    fn forward_then_inverse_round_trips() {
        let xform = IdentityTransform;
        let joints = JointSpaceCoordinate::new([0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        let pose = xform.forward(&joints);
        let back = xform.inverse(&pose, &joints).unwrap();
        assert_eq!(back.q, joints.q);
    }

    #[test]
    fn inverse_reports_unreachable() {
        let xform = IdentityTransform;
        let pose = CartesianCoordinate::new([f64::NAN, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let seed = JointSpaceCoordinate::new([0.0; DOF]);
        assert!(matches!(
            xform.inverse(&pose, &seed),
            Err(KinematicsError::Unreachable(_))
        ));
    }
}
