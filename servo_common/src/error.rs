//! Workspace-wide error kinds (§7).
//!
//! Per-boundary `thiserror` enums: narrower errors at a crate's own
//! boundary convert into this one via `#[from]` so callers that only
//! care about the top-level kind don't need to match on transport- or
//! config-specific variants.

use thiserror::Error;

/// Error conditions surfaced across the joint-control / trajectory-playback
/// stack.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied argument violates a documented precondition
    /// (e.g. `playback_speed > 1.0`).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Inverse kinematics could not find a joint solution for the
    /// requested Cartesian pose.
    #[error("pose unreachable: {0}")]
    Unreachable(String),

    /// A joint failed to acknowledge within one scheduler cycle.
    #[error("communication lost with joint {joint}: {reason}")]
    CommunicationLost {
        /// 1-based joint/node id.
        joint: u8,
        /// Human-readable cause (timeout, CRC mismatch, ...).
        reason: String,
    },

    /// An operation was attempted before `isInitComplete()` / the
    /// handshake reached `Ready`.
    #[error("device not ready: {0}")]
    DeviceNotReady(String),

    /// A configuration file failed to load or validate.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// A precondition internal to this crate was violated; always a
    /// programmer error, never a runtime condition a caller can recover
    /// from. Treated as fatal (§5: "treated as a programmer error").
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl Error {
    /// Shorthand for the [`Error::InvalidArgument`] variant.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Shorthand for the [`Error::InvariantViolation`] variant.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;
