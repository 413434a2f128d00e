//! The `Channel` abstraction (§6): the one collaborator
//! `JointCommunicator` speaks to, independent of whether bytes cross a
//! real serial link or stay in-process.

use std::time::Duration;

/// One unit of wire traffic: a node id (1..=6, §6), an opcode
/// identifying the payload's meaning (`JointCommunicator` is the sole
/// interpreter, §6), and the opcode-specific payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 1-based node id this frame targets or originated from.
    pub node_id: u8,
    /// Opcode selecting the payload's meaning (see [`crate::opcode`]).
    pub opcode: u8,
    /// Opcode-specific payload bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Construct a frame.
    pub fn new(node_id: u8, opcode: u8, payload: Vec<u8>) -> Self {
        Self {
            node_id,
            opcode,
            payload,
        }
    }
}

/// Transport-boundary errors (§10.2: narrower per-crate error types
/// that convert into `servo_common::Error` at the call site, where the
/// joint id is known).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// No frame arrived from `node_id` within the requested timeout.
    #[error("no response from node {0} within timeout")]
    Timeout(u8),

    /// A frame's CRC did not match its contents (§6: "length-prefixed
    /// framing with CRC").
    #[error("CRC mismatch on frame from node {node_id}")]
    CrcMismatch {
        /// Node id the malformed frame claimed to be from.
        node_id: u8,
    },

    /// A frame's header was structurally invalid (bad length, no sync
    /// byte found within a reasonable window, etc).
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The underlying transport (serial port) returned an I/O error.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract bidirectional transport between the host and N device
/// nodes (§6). Two concrete implementations ship in this crate:
/// [`crate::serial::SerialChannel`] (a real microcontroller over a
/// serial port) and [`crate::simulated::SimulatedChannel`] (an
/// in-process loopback pair, so the whole system is runnable without
/// hardware).
pub trait Channel: Send {
    /// Transmit `payload` to `node_id` under `opcode`.
    fn send_to(&mut self, node_id: u8, opcode: u8, payload: &[u8]) -> Result<(), ChannelError>;

    /// Block up to `timeout` for the next inbound frame, returning
    /// `Ok(None)` on a clean timeout (not an error — callers poll this
    /// every scheduler cycle, §4.4 `run()`).
    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, ChannelError>;
}
