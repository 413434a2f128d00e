//! An in-process simulated device loop: real [`ServoControlLoop`]
//! instances driven over a [`SimulatedChannel`], so `--channel simulated`
//! exercises the full host↔wire↔device loop without hardware (§1
//! Non-goals note: the optical-encoder table, PWM silicon, and wire
//! framing are black boxes this workspace only specifies the edge of;
//! `servo_transport` already ships the reference simulated transport —
//! this module is the matching reference *device*).
//!
//! Simplification versus real firmware: rather than ticking at a free-
//! running 833 Hz independent of host traffic, each joint's control
//! loop advances by exactly one tick per request it receives. The host
//! scheduler's 12 ms cycle and the device's nominal 1.2 ms tick are
//! both configurable; this loop does not attempt to fill the gap with
//! untriggered ticks. Good enough for a CLI demo; not a substitute for
//! the cadence guarantees `servo_device::rt::DeviceRuntime` provides
//! against real hardware.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use servo_common::{consts, ReferenceTriplet};
use servo_device::encoder::simulated::{RecordingCurrentSink, SimulatedQuadratureEncoder};
use servo_device::{ServoControlLoop, ServoControlLoopConfig};
use servo_host::communicator::encode_telemetry;
use servo_transport::{opcode, Channel, SimulatedChannel};
use tracing::{debug, warn};

/// Per-joint simulation parameters for [`spawn`].
#[derive(Debug, Clone, Copy)]
pub struct SimulatedDeviceConfig {
    /// Wire node id this joint answers to (1..=6, §6).
    pub node_id: u8,
    /// Selects the state-feedback gain table (§3).
    pub control_speed: u8,
    /// Selects the backlash-compensation gain (§3).
    pub backlash_control_speed: u8,
    /// Simulated plant inertia [ticks/(current·s²)].
    pub inertia: f64,
    /// Simulated plant viscous damping [1/s].
    pub damping: f64,
    /// Encoder ticks per mechanical revolution.
    pub ticks_per_revolution: f64,
}

fn build_servo(config: SimulatedDeviceConfig) -> ServoControlLoop {
    let dt_s = consts::GET_TIME_INTERVAL_US_DEFAULT as f64 / 1_000_000.0;
    let servo_config = ServoControlLoopConfig {
        control_speed: config.control_speed,
        backlash_control_speed: config.backlash_control_speed,
        dt_s,
        u_limit: 2000.0,
        ticks_per_revolution: config.ticks_per_revolution,
        stale_hold_multiple: consts::STALE_HOLD_MULTIPLE,
        stale_disable_multiple: consts::STALE_DISABLE_MULTIPLE,
    };
    let mut servo = ServoControlLoop::new(
        servo_config,
        Box::new(SimulatedQuadratureEncoder::new(
            config.inertia,
            config.damping,
            dt_s,
        )),
        None,
        Box::new(RecordingCurrentSink::default()),
    );
    servo.enable(true);
    servo
}

fn apply_frame(servo: &mut ServoControlLoop, now_us: u64, opcode_byte: u8, payload: &[u8]) {
    match opcode_byte {
        opcode::SET_REFERENCE if payload.len() >= 8 => {
            let position = f32::from_le_bytes(payload[0..4].try_into().unwrap());
            let velocity = i16::from_le_bytes(payload[4..6].try_into().unwrap());
            let feed_forward = i16::from_le_bytes(payload[6..8].try_into().unwrap());
            servo.load_new_reference(
                now_us,
                ReferenceTriplet {
                    position,
                    velocity,
                    feed_forward,
                },
            );
        }
        opcode::SET_OPEN_LOOP_SIGNAL if payload.len() >= 3 => {
            let value = i16::from_le_bytes([payload[0], payload[1]]);
            let active = payload[2] != 0;
            servo.set_open_loop_control_signal(value, active);
        }
        opcode::SET_ENABLE if !payload.is_empty() => {
            servo.enable(payload[0] != 0);
        }
        opcode::QUERY_STATE => {}
        other => debug!(opcode = other, "simulated device: unhandled opcode"),
    }
}

/// Spawn the background thread owning every configured joint's
/// `ServoControlLoop` and answering requests on `device_end`. Returns
/// when `device_end`'s peer (the host) is dropped.
pub fn spawn(device_end: SimulatedChannel, configs: Vec<SimulatedDeviceConfig>) -> JoinHandle<()> {
    thread::spawn(move || run(device_end, configs))
}

fn run(mut device_end: SimulatedChannel, configs: Vec<SimulatedDeviceConfig>) {
    let mut joints: Vec<(u8, ServoControlLoop)> = configs
        .into_iter()
        .map(|c| (c.node_id, build_servo(c)))
        .collect();
    let mut now_us: u64 = 0;
    let tick_period_us = consts::GET_TIME_INTERVAL_US_DEFAULT as u64;

    loop {
        match device_end.receive(Duration::from_millis(200)) {
            Ok(Some(frame)) => {
                let Some((_, servo)) = joints.iter_mut().find(|(id, _)| *id == frame.node_id)
                else {
                    warn!(node_id = frame.node_id, "simulated device: unknown node id");
                    continue;
                };

                apply_frame(servo, now_us, frame.opcode, &frame.payload);
                servo.tick(now_us);
                now_us += tick_period_us;

                let payload = encode_telemetry(
                    servo.position(),
                    servo.velocity(),
                    servo.control_error(),
                    servo.current(),
                    servo.control_signal(),
                    None,
                );
                if device_end
                    .send_to(frame.node_id, opcode::TELEMETRY, &payload)
                    .is_err()
                {
                    return;
                }
            }
            Ok(None) => continue,
            Err(_) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use servo_transport::opcode;

    #[test]
    fn answers_query_state_with_telemetry() {
        let (mut host_end, device_end) = SimulatedChannel::pair();
        let _device = spawn(
            device_end,
            vec![SimulatedDeviceConfig {
                node_id: 1,
                control_speed: 50,
                backlash_control_speed: 10,
                inertia: 1.0,
                damping: 0.1,
                ticks_per_revolution: 4096.0,
            }],
        );

        host_end.send_to(1, opcode::QUERY_STATE, &[]).unwrap();
        let frame = host_end
            .receive(Duration::from_millis(500))
            .unwrap()
            .unwrap();
        assert_eq!(frame.opcode, opcode::TELEMETRY);
        assert_eq!(frame.node_id, 1);
    }

    #[test]
    fn unknown_node_id_is_ignored() {
        let (mut host_end, device_end) = SimulatedChannel::pair();
        let _device = spawn(
            device_end,
            vec![SimulatedDeviceConfig {
                node_id: 1,
                control_speed: 50,
                backlash_control_speed: 10,
                inertia: 1.0,
                damping: 0.1,
                ticks_per_revolution: 4096.0,
            }],
        );

        host_end.send_to(9, opcode::QUERY_STATE, &[]).unwrap();
        let reply = host_end.receive(Duration::from_millis(200)).unwrap();
        assert!(reply.is_none());
    }
}
