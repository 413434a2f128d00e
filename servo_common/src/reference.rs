//! Device-side reference triplets and the host↔device affine transform
//! (§3 `ReferenceTriplet`, §6 "Joint reference frame").

use serde::{Deserialize, Serialize};

/// The device-side command for one joint: a position (float ticks) plus
/// velocity and feed-forward terms (both scaled into `i16`, the on-wire
/// integer representation the microcontroller's current loop expects).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReferenceTriplet {
    /// Position reference [device ticks].
    pub position: f32,
    /// Velocity reference [device ticks/s], clamped to `i16` range.
    pub velocity: i16,
    /// Feed-forward control signal [device ticks], clamped to `i16` range.
    pub feed_forward: i16,
}

impl ReferenceTriplet {
    /// A triplet holding still at `position` with zero velocity/feed-forward.
    pub fn hold(position: f32) -> Self {
        Self {
            position,
            velocity: 0,
            feed_forward: 0,
        }
    }
}

/// Per-joint affine transform between host SI units and device ticks
/// (§6). `position_reference_offset` is chosen at init time so that the
/// first reference sent equals the joint's current device position —
/// the bumpless-handover contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointScaling {
    /// SI units per device tick, e.g. `2*pi/4096.0` for a 12-bit encoder
    /// revolving through one turn.
    pub scale: f64,
    /// Constant SI offset applied before scaling (mechanical zero).
    pub offset: f64,
    /// Device-tick offset applied after scaling (bumpless-handover seed).
    pub position_reference_offset: f64,
    /// Multiplier from SI feed-forward/control units to device ticks.
    pub u_scale: f64,
}

impl JointScaling {
    /// Encode a host-side `(position, velocity, feed_forward)` triplet in
    /// SI units into the device's `ReferenceTriplet` representation.
    pub fn encode(&self, position_si: f64, velocity_si: f64, u_si: f64) -> ReferenceTriplet {
        let position =
            (position_si / self.scale - self.position_reference_offset) as f32;
        let velocity = clamp_to_i16(velocity_si / self.scale);
        let feed_forward = clamp_to_i16(u_si * self.u_scale);
        ReferenceTriplet {
            position,
            velocity,
            feed_forward,
        }
    }

    /// Decode a device-side position reading (in ticks) back into SI
    /// units — the inverse of the position half of [`Self::encode`].
    pub fn decode_position(&self, position_ticks: f64) -> f64 {
        (position_ticks + self.position_reference_offset) * self.scale + self.offset
    }

    /// Decode a device-side velocity reading (ticks/s) back into SI units.
    pub fn decode_velocity(&self, velocity_ticks: f64) -> f64 {
        velocity_ticks * self.scale
    }

    /// Choose `position_reference_offset` so that encoding
    /// `current_position_si` round-trips to `current_position_ticks`
    /// exactly — the bumpless-handover seed performed once during
    /// `JointCommunicator` initialisation.
    pub fn seed_offset_for_bumpless_handover(
        &mut self,
        current_position_si: f64,
        current_position_ticks: f64,
    ) {
        self.position_reference_offset =
            (current_position_si - self.offset) / self.scale - current_position_ticks;
    }
}

#[inline]
fn clamp_to_i16(v: f64) -> i16 {
    v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scaling() -> JointScaling {
        JointScaling {
            scale: 2.0 * std::f64::consts::PI / 4096.0,
            offset: 0.0,
            position_reference_offset: 0.0,
            u_scale: 1.0,
        }
    }

    #[test]
    fn round_trip_scaling_within_one_tick() {
        let s = scaling();
        let position_si = 1.2345;
        let velocity_si = 3.0;
        let u_si = 10.0;

        let triplet = s.encode(position_si, velocity_si, u_si);
        let decoded_position = s.decode_position(triplet.position as f64);
        let decoded_velocity = s.decode_velocity(triplet.velocity as f64);

        assert!((decoded_position - position_si).abs() <= s.scale);
        assert!((decoded_velocity - velocity_si).abs() <= s.scale);
    }

    #[test]
    fn velocity_clamps_to_i16_range() {
        let s = scaling();
        let triplet = s.encode(0.0, 1.0e9, 0.0);
        assert_eq!(triplet.velocity, i16::MAX);

        let triplet = s.encode(0.0, -1.0e9, 0.0);
        assert_eq!(triplet.velocity, i16::MIN);
    }

    #[test]
    fn bumpless_seed_round_trips_to_same_ticks() {
        let mut s = scaling();
        let current_si = 0.75;
        let current_ticks = 512.0;
        s.seed_offset_for_bumpless_handover(current_si, current_ticks);

        let triplet = s.encode(current_si, 0.0, 0.0);
        assert!((triplet.position as f64 - current_ticks).abs() < 1e-6);
    }

    #[test]
    fn hold_has_zero_velocity_and_feed_forward() {
        let t = ReferenceTriplet::hold(42.0);
        assert_eq!(t.position, 42.0);
        assert_eq!(t.velocity, 0);
        assert_eq!(t.feed_forward, 0);
    }
}
