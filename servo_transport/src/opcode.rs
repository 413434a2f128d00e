//! Wire opcodes (§6: "a node id 1..6 and an opcode; the
//! `JointCommunicator` is the sole interpreter").
//!
//! Kept as plain `u8` constants rather than an enum so a
//! [`crate::channel::Frame`] built from one of these never needs a
//! fallible conversion on the hot path; `servo_host`'s
//! `JointCommunicator` is the only code that interprets the byte.

/// Host → device: a new reference triplet (§4.1 `loadNew`).
pub const SET_REFERENCE: u8 = 0x01;

/// Host → device: raw open-loop current/PWM signal (§4.3
/// `setOpenLoopControlSignal`).
pub const SET_OPEN_LOOP_SIGNAL: u8 = 0x02;

/// Host → device: enable/disable closed-loop control.
pub const SET_ENABLE: u8 = 0x03;

/// Host → device: query current state, used during the handshake
/// (§4.4 init sequence step (a)).
pub const QUERY_STATE: u8 = 0x04;

/// Device → host: telemetry reply (position, velocity, control error,
/// current, control signal, optional optical-encoder diagnostic).
pub const TELEMETRY: u8 = 0x10;

/// Device → host: acknowledgement with no telemetry payload.
pub const ACK: u8 = 0x11;
