//! Wires a loaded [`RobotConfig`] into a handshake-complete
//! [`RobotScheduler`]: builds the configured [`Channel`], one
//! [`JointCommunicator`] per joint, and — for a simulated channel — the
//! paired in-process device loop from [`crate::sim_device`] so the CLI
//! is runnable end to end without hardware.

use std::time::Duration;

use servo_common::config::{ChannelConfig, RobotConfig};
use servo_common::{Error, Result};
use servo_host::{JointCommunicator, RobotScheduler};
use servo_transport::{SerialChannel, SimulatedChannel};

use crate::sim_device::{self, SimulatedDeviceConfig};

/// Build and return a scheduler whose handshake has already completed
/// for every configured joint (blocking, per [`RobotScheduler::new`]).
pub fn build_scheduler(config: &RobotConfig) -> Result<RobotScheduler> {
    let channel = build_channel(config)?;

    let joints = config
        .joints
        .iter()
        .map(|joint| JointCommunicator::new(joint.node_id, joint.scaling.clone()))
        .collect();

    let cycle_time = Duration::from_millis(config.cycle_time_ms as u64);
    Ok(RobotScheduler::new(joints, channel, cycle_time))
}

/// The position in `config.joints` (and so in the scheduler's joint
/// vector, built in the same order) whose `node_id` is `node_id`.
pub fn joint_index(config: &RobotConfig, node_id: u8) -> Result<usize> {
    config
        .joints
        .iter()
        .position(|j| j.node_id == node_id)
        .ok_or_else(|| Error::invalid_argument(format!("no configured joint with node_id {node_id}")))
}

fn build_channel(config: &RobotConfig) -> Result<Box<dyn servo_transport::Channel>> {
    match &config.channel {
        ChannelConfig::Serial { device, baud } => {
            let channel = SerialChannel::open(device, *baud).map_err(|e| {
                Error::DeviceNotReady(format!("failed to open serial channel {device}: {e}"))
            })?;
            Ok(Box::new(channel))
        }
        ChannelConfig::Simulated => {
            let (host_end, device_end) = SimulatedChannel::pair();
            let device_configs = config
                .joints
                .iter()
                .map(|joint| SimulatedDeviceConfig {
                    node_id: joint.node_id,
                    control_speed: joint.control_speed,
                    backlash_control_speed: joint.backlash_control_speed,
                    inertia: 1.0,
                    damping: 0.2,
                    ticks_per_revolution: 4096.0,
                })
                .collect();
            sim_device::spawn(device_end, device_configs);
            Ok(Box::new(host_end))
        }
    }
}
