//! Per-joint host-side communication state machine (§4.4).
//!
//! One `JointCommunicator` wraps a single node id on a shared
//! [`servo_transport::Channel`]. The scheduler drives every joint's
//! `run()` once per cycle; `Channel` access is serialised by that
//! single caller, so no internal locking is needed (§5).

use std::time::Duration;

use servo_common::reference::JointScaling;
use tracing::{debug, info, warn};

use servo_transport::{opcode, Channel, ChannelError, Frame};

/// How long `run()` waits for a reply before treating the cycle as a
/// miss. Generous relative to the 12 ms scheduler cycle (§4.6) since
/// the wait only blocks this one joint's slice of a single cycle.
const RECEIVE_TIMEOUT: Duration = Duration::from_millis(4);

/// Per-joint handshake progress (§3 "JointCommunicator handshake state").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Waiting for the device's first telemetry reply to seed the
    /// bumpless-handover offset.
    DiscoveringOffset,
    /// Offset seeded; waiting for one more confirmed round trip before
    /// declaring the joint ready.
    InitPending,
    /// Initialisation complete; `run()` now pumps ordinary traffic.
    Ready,
}

/// Optical-encoder channel diagnostic, decoded from a telemetry frame's
/// optional trailer (§9 "Diagnostic retrieval is optional — absence
/// returns empty").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpticalEncoderChannelData {
    pub a: u16,
    pub b: u16,
    pub min_cost_index: u16,
    pub min_cost: u16,
}

#[derive(Debug, Clone, Copy)]
enum PendingCommand {
    None,
    Reference {
        position_si: f64,
        velocity_si: f64,
        u_si: f64,
    },
    OpenLoop {
        value: i16,
        active: bool,
    },
    Enable(bool),
}

/// Per-joint send/recv state machine over a shared [`Channel`] (§4.4).
pub struct JointCommunicator {
    node_id: u8,
    scaling: JointScaling,
    state: HandshakeState,
    pending: PendingCommand,
    position: f64,
    velocity: f64,
    control_error: f64,
    current: i16,
    control_signal: i16,
    optical: Option<OpticalEncoderChannelData>,
    communication_ok: bool,
}

impl JointCommunicator {
    /// Construct a fresh communicator in `DiscoveringOffset` (§3: "on
    /// construction all 6 are `DiscoveringOffset`").
    pub fn new(node_id: u8, scaling: JointScaling) -> Self {
        Self {
            node_id,
            scaling,
            state: HandshakeState::DiscoveringOffset,
            pending: PendingCommand::None,
            position: 0.0,
            velocity: 0.0,
            control_error: 0.0,
            current: 0,
            control_signal: 0,
            optical: None,
            communication_ok: true,
        }
    }

    /// Queue a new reference triplet in SI units for transmission on
    /// the next `run()`.
    pub fn set_reference(&mut self, position_si: f64, velocity_si: f64, u_si: f64) {
        self.pending = PendingCommand::Reference {
            position_si,
            velocity_si,
            u_si,
        };
    }

    /// Queue a raw open-loop control signal (§4.3 `setOpenLoopControlSignal`).
    pub fn set_open_loop_control_signal(&mut self, value: i16, active: bool) {
        self.pending = PendingCommand::OpenLoop { value, active };
    }

    /// Queue an enable/disable transition.
    pub fn set_enable(&mut self, on: bool) {
        self.pending = PendingCommand::Enable(on);
    }

    /// Reconfigure the host↔device affine transform (§6). Used once at
    /// startup from the loaded `JointConfig`; the device side never
    /// sees this directly, it only ever receives already-scaled ticks.
    pub fn set_offset_and_scaling(&mut self, scale: f64, offset: f64, position_reference_offset: f64) {
        self.scaling.scale = scale;
        self.scaling.offset = offset;
        self.scaling.position_reference_offset = position_reference_offset;
    }

    pub fn get_position(&self) -> f64 {
        self.position
    }

    pub fn get_velocity(&self) -> f64 {
        self.velocity
    }

    pub fn get_control_error(&self) -> f64 {
        self.control_error
    }

    pub fn get_current(&self) -> i16 {
        self.current
    }

    pub fn get_control_signal(&self) -> i16 {
        self.control_signal
    }

    pub fn get_optical_encoder_channel_data(&self) -> Option<OpticalEncoderChannelData> {
        self.optical
    }

    pub fn is_init_complete(&self) -> bool {
        self.state == HandshakeState::Ready
    }

    pub fn is_communication_ok(&self) -> bool {
        self.communication_ok
    }

    /// Drive one cycle: transmit any pending command, receive any
    /// pending telemetry, and advance the handshake (§4.4). Never
    /// returns an error directly — communication failures are recorded
    /// via [`Self::is_communication_ok`], inspected by the recv handler
    /// (§5 "Timeouts").
    pub fn run(&mut self, channel: &mut dyn Channel) {
        match self.state {
            HandshakeState::DiscoveringOffset | HandshakeState::InitPending => {
                self.run_handshake(channel);
            }
            HandshakeState::Ready => self.run_steady_state(channel),
        }
    }

    fn run_handshake(&mut self, channel: &mut dyn Channel) {
        if let Err(e) = channel.send_to(self.node_id, opcode::QUERY_STATE, &[]) {
            warn!(node_id = self.node_id, error = %e, "handshake query send failed");
            return;
        }

        match channel.receive(RECEIVE_TIMEOUT) {
            Ok(Some(frame)) if frame.opcode == opcode::TELEMETRY => {
                let sample = decode_telemetry(&frame.payload);
                self.apply_telemetry(&sample);

                match self.state {
                    HandshakeState::DiscoveringOffset => {
                        let natural_si = self.scaling.decode_position(sample.position_ticks);
                        self.scaling
                            .seed_offset_for_bumpless_handover(natural_si, sample.position_ticks);
                        self.state = HandshakeState::InitPending;
                    }
                    HandshakeState::InitPending => {
                        self.state = HandshakeState::Ready;
                        info!(node_id = self.node_id, "joint handshake complete");
                    }
                    HandshakeState::Ready => unreachable!(),
                }
            }
            Ok(_) => {
                debug!(node_id = self.node_id, "handshake: no reply this cycle");
            }
            Err(e) => {
                warn!(node_id = self.node_id, error = %e, "handshake receive failed");
            }
        }
    }

    fn run_steady_state(&mut self, channel: &mut dyn Channel) {
        if let Err(e) = self.transmit_pending(channel) {
            warn!(node_id = self.node_id, error = %e, "command send failed");
        }

        match channel.receive(RECEIVE_TIMEOUT) {
            Ok(Some(frame)) if frame.opcode == opcode::TELEMETRY => {
                let sample = decode_telemetry(&frame.payload);
                self.apply_telemetry(&sample);
                self.communication_ok = true;
            }
            Ok(Some(_)) => {
                self.communication_ok = true;
            }
            Ok(None) => {
                self.communication_ok = false;
            }
            Err(ChannelError::CrcMismatch { .. }) | Err(ChannelError::Malformed(_)) => {
                self.communication_ok = false;
            }
            Err(e) => {
                warn!(node_id = self.node_id, error = %e, "receive failed");
                self.communication_ok = false;
            }
        }
    }

    fn transmit_pending(&mut self, channel: &mut dyn Channel) -> Result<(), ChannelError> {
        let pending = self.pending;
        self.pending = PendingCommand::None;

        match pending {
            PendingCommand::None => Ok(()),
            PendingCommand::Reference {
                position_si,
                velocity_si,
                u_si,
            } => {
                let triplet = self.scaling.encode(position_si, velocity_si, u_si);
                let mut payload = Vec::with_capacity(8);
                payload.extend_from_slice(&triplet.position.to_le_bytes());
                payload.extend_from_slice(&triplet.velocity.to_le_bytes());
                payload.extend_from_slice(&triplet.feed_forward.to_le_bytes());
                channel.send_to(self.node_id, opcode::SET_REFERENCE, &payload)
            }
            PendingCommand::OpenLoop { value, active } => {
                let payload = [value.to_le_bytes()[0], value.to_le_bytes()[1], active as u8];
                channel.send_to(self.node_id, opcode::SET_OPEN_LOOP_SIGNAL, &payload)
            }
            PendingCommand::Enable(on) => {
                channel.send_to(self.node_id, opcode::SET_ENABLE, &[on as u8])
            }
        }
    }

    fn apply_telemetry(&mut self, sample: &TelemetrySample) {
        self.position = self.scaling.decode_position(sample.position_ticks);
        self.velocity = self.scaling.decode_velocity(sample.velocity_ticks as f64);
        self.control_error = sample.control_error_ticks * self.scaling.scale;
        self.current = sample.current;
        self.control_signal = sample.control_signal;
        self.optical = sample.optical;
    }
}

struct TelemetrySample {
    position_ticks: f64,
    velocity_ticks: i16,
    control_error_ticks: f64,
    current: i16,
    control_signal: i16,
    optical: Option<OpticalEncoderChannelData>,
}

/// Wire layout: `pos:f32 LE, vel:i16 LE, err:f32 LE, current:i16 LE,
/// ctrl:i16 LE, has_diag:u8, a:u16 LE, b:u16 LE, min_idx:u16 LE, min_cost:u16 LE`.
/// Fixed width (23 bytes) regardless of `has_diag` so a short/garbled
/// frame is detectable by length alone.
fn decode_telemetry(payload: &[u8]) -> TelemetrySample {
    if payload.len() < 23 {
        return TelemetrySample {
            position_ticks: 0.0,
            velocity_ticks: 0,
            control_error_ticks: 0.0,
            current: 0,
            control_signal: 0,
            optical: None,
        };
    }

    let position_ticks = f32::from_le_bytes(payload[0..4].try_into().unwrap()) as f64;
    let velocity_ticks = i16::from_le_bytes(payload[4..6].try_into().unwrap());
    let control_error_ticks = f32::from_le_bytes(payload[6..10].try_into().unwrap()) as f64;
    let current = i16::from_le_bytes(payload[10..12].try_into().unwrap());
    let control_signal = i16::from_le_bytes(payload[12..14].try_into().unwrap());
    let has_diag = payload[14] != 0;
    let optical = has_diag.then(|| OpticalEncoderChannelData {
        a: u16::from_le_bytes(payload[15..17].try_into().unwrap()),
        b: u16::from_le_bytes(payload[17..19].try_into().unwrap()),
        min_cost_index: u16::from_le_bytes(payload[19..21].try_into().unwrap()),
        min_cost: u16::from_le_bytes(payload[21..23].try_into().unwrap()),
    });

    TelemetrySample {
        position_ticks,
        velocity_ticks,
        control_error_ticks,
        current,
        control_signal,
        optical,
    }
}

/// Build a telemetry payload in the wire layout [`decode_telemetry`]
/// expects. Used by the simulated device stand-ins in tests and by any
/// future firmware harness that wants to exercise this crate in
/// isolation.
pub fn encode_telemetry(
    position_ticks: f64,
    velocity_ticks: i16,
    control_error_ticks: f64,
    current: i16,
    control_signal: i16,
    optical: Option<OpticalEncoderChannelData>,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(23);
    out.extend_from_slice(&(position_ticks as f32).to_le_bytes());
    out.extend_from_slice(&velocity_ticks.to_le_bytes());
    out.extend_from_slice(&(control_error_ticks as f32).to_le_bytes());
    out.extend_from_slice(&current.to_le_bytes());
    out.extend_from_slice(&control_signal.to_le_bytes());
    match optical {
        Some(d) => {
            out.push(1);
            out.extend_from_slice(&d.a.to_le_bytes());
            out.extend_from_slice(&d.b.to_le_bytes());
            out.extend_from_slice(&d.min_cost_index.to_le_bytes());
            out.extend_from_slice(&d.min_cost.to_le_bytes());
        }
        None => out.extend_from_slice(&[0u8; 9]),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use servo_transport::SimulatedChannel;
    use std::thread;
    use std::time::Duration as StdDuration;

    fn scaling() -> JointScaling {
        JointScaling {
            scale: 2.0 * std::f64::consts::PI / 4096.0,
            offset: 0.0,
            position_reference_offset: 0.0,
            u_scale: 1.0,
        }
    }

    /// Answers every `QUERY_STATE`/`SET_*` with a fixed telemetry frame,
    /// standing in for a device while a joint's handshake and steady
    /// state are exercised.
    fn spawn_stub_device(mut device_end: SimulatedChannel, position_ticks: f64) {
        thread::spawn(move || loop {
            match device_end.receive(StdDuration::from_millis(200)) {
                Ok(Some(_frame)) => {
                    let payload = encode_telemetry(position_ticks, 0, 0.0, 0, 0, None);
                    if device_end
                        .send_to(1, opcode::TELEMETRY, &payload)
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(None) => continue,
                Err(_) => break,
            }
        });
    }

    #[test]
    fn handshake_reaches_ready_and_seeds_position() {
        let (mut host_end, device_end) = SimulatedChannel::pair();
        spawn_stub_device(device_end, 100.0);

        let mut joint = JointCommunicator::new(1, scaling());
        assert!(!joint.is_init_complete());

        for _ in 0..5 {
            joint.run(&mut host_end);
            if joint.is_init_complete() {
                break;
            }
        }

        assert!(joint.is_init_complete());
        let expected = scaling().decode_position(100.0);
        assert!((joint.get_position() - expected).abs() < 1e-9);
    }

    #[test]
    fn communication_loss_marks_not_ok() {
        let (mut host_end, _device_end) = SimulatedChannel::pair();
        // No stub device: every receive times out, but force into Ready
        // by hand to isolate the steady-state path.
        let mut joint = JointCommunicator::new(1, scaling());
        joint.state = HandshakeState::Ready;

        joint.run(&mut host_end);
        assert!(!joint.is_communication_ok());
    }

    #[test]
    fn steady_state_round_trips_reference_and_telemetry() {
        let (mut host_end, device_end) = SimulatedChannel::pair();
        spawn_stub_device(device_end, 42.0);

        let mut joint = JointCommunicator::new(1, scaling());
        for _ in 0..5 {
            joint.run(&mut host_end);
            if joint.is_init_complete() {
                break;
            }
        }
        assert!(joint.is_init_complete());

        joint.set_reference(1.0, 0.0, 0.0);
        joint.run(&mut host_end);
        assert!(joint.is_communication_ok());
    }
}
