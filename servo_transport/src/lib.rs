//! The `Channel` abstraction and its two concrete transports (§6).
//!
//! # Module Structure
//!
//! - [`channel`] - [`channel::Channel`] trait, [`channel::Frame`], [`channel::ChannelError`]
//! - [`framing`] - length-prefixed, CRC-16 wire encoding shared by [`serial`]
//! - [`serial`] - [`serial::SerialChannel`], a real microcontroller over a serial port
//! - [`simulated`] - [`simulated::SimulatedChannel`], an in-process loopback pair
//! - [`opcode`] - wire opcode constants `JointCommunicator` interprets

pub mod channel;
pub mod framing;
pub mod opcode;
pub mod serial;
pub mod simulated;

pub use channel::{Channel, ChannelError, Frame};
pub use serial::SerialChannel;
pub use simulated::SimulatedChannel;
