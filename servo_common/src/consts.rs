//! System-wide constants for the servo workspace.
//!
//! Single source of truth for cadence and gain-table bounds. Imported by
//! `servo_device` and `servo_host` — no duplication permitted.

/// Nominal interval between host reference updates [µs] (~83 Hz).
pub const LOAD_TIME_INTERVAL_US_DEFAULT: u32 = 12_000;

/// Device control-loop tick period [µs] (~833 Hz).
pub const GET_TIME_INTERVAL_US_DEFAULT: u32 = 1_200;

/// Host scheduler cycle time [ms], matches `LOAD_TIME_INTERVAL_US_DEFAULT`.
pub const SCHEDULER_CYCLE_TIME_MS_DEFAULT: u32 = 12;

/// Watchdog: hold last reference once `loadNew` is stale for this multiple
/// of `loadTimeInterval`.
pub const STALE_HOLD_MULTIPLE: u32 = 2;

/// Watchdog: disable policy trigger — no `loadNew` for this multiple of
/// `loadTimeInterval`.
pub const STALE_DISABLE_MULTIPLE: u32 = 3;

/// Gain tables are indexed 0..=255 by `controlSpeed` / `backlashControlSpeed`.
pub const CONTROL_SPEED_MAX: u8 = 255;

/// Size of the compiled-in encoder calibration tables (owned by the
/// `EncoderSource` black box, not by this crate — kept here only so the
/// bound is shared if a driver needs it).
pub const ENCODER_TABLE_LEN: usize = 512;
