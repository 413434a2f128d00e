//! TOML configuration loader with validation (§10.3).
//!
//! Parse, then run bounds/uniqueness validation, returning a
//! descriptive `ConfigError` rather than panicking.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::{GET_TIME_INTERVAL_US_DEFAULT, LOAD_TIME_INTERVAL_US_DEFAULT};
use crate::reference::JointScaling;
use crate::DOF;

/// Configuration loading/validation error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed to open.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file's contents are not valid TOML for `RobotConfig`.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A parsed value violates a documented bound.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Transport selection for a joint's `Channel` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelConfig {
    /// A serial transport to a physical microcontroller.
    Serial {
        /// OS device path, e.g. `/dev/ttyUSB0`.
        device: String,
        /// Baud rate; must be >= 115200 per §6.
        baud: u32,
    },
    /// An in-process simulated transport (no hardware required).
    Simulated,
}

/// Per-joint configuration: node id, affine scaling, and gain-table
/// selectors (§3 `EstimatorState`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointConfig {
    /// 1-based node id on the wire (1..=6, §6).
    pub node_id: u8,
    /// Host↔device affine transform, seeded at runtime for bumpless
    /// handover.
    pub scaling: JointScaling,
    /// Index into the precomputed state-feedback gain table.
    #[serde(default = "default_control_speed")]
    pub control_speed: u8,
    /// Index into the precomputed backlash-compensation gain table.
    #[serde(default = "default_backlash_control_speed")]
    pub backlash_control_speed: u8,
}

fn default_control_speed() -> u8 {
    50
}

fn default_backlash_control_speed() -> u8 {
    10
}

/// Device-side cadence configuration (§3 `ReferenceInterpolator state`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceTimingConfig {
    /// Nominal interval between host reference updates [µs].
    #[serde(default = "default_load_time_interval_us")]
    pub load_time_interval_us: u32,
    /// Device control-loop tick period [µs].
    #[serde(default = "default_get_time_interval_us")]
    pub get_time_interval_us: u32,
}

fn default_load_time_interval_us() -> u32 {
    LOAD_TIME_INTERVAL_US_DEFAULT
}

fn default_get_time_interval_us() -> u32 {
    GET_TIME_INTERVAL_US_DEFAULT
}

impl Default for DeviceTimingConfig {
    fn default() -> Self {
        Self {
            load_time_interval_us: default_load_time_interval_us(),
            get_time_interval_us: default_get_time_interval_us(),
        }
    }
}

/// Top-level robot configuration, loaded once at CLI startup (§10.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Host scheduler cycle time [ms] (§4.6). Must match
    /// `timing.load_time_interval_us` to the nearest millisecond.
    pub cycle_time_ms: u32,
    /// Per-joint channel transport.
    pub channel: ChannelConfig,
    /// Device-side cadence shared by all joints.
    #[serde(default)]
    pub timing: DeviceTimingConfig,
    /// Exactly `servo_common::DOF` entries, one per joint.
    pub joints: Vec<JointConfig>,
}

impl RobotConfig {
    /// Load and validate a [`RobotConfig`] from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: RobotConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Run all bounds/uniqueness validation rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.joints.len() != DOF {
            return Err(ConfigError::Validation(format!(
                "expected {DOF} joints, found {}",
                self.joints.len()
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for joint in &self.joints {
            if !(1..=DOF as u8).contains(&joint.node_id) {
                return Err(ConfigError::Validation(format!(
                    "joint node_id {} out of range 1..={DOF}",
                    joint.node_id
                )));
            }
            if !seen.insert(joint.node_id) {
                return Err(ConfigError::Validation(format!(
                    "duplicate joint node_id {}",
                    joint.node_id
                )));
            }
        }

        if let ChannelConfig::Serial { baud, .. } = &self.channel {
            if *baud < 115_200 {
                return Err(ConfigError::Validation(format!(
                    "serial baud {baud} below minimum 115200"
                )));
            }
        }

        if self.timing.get_time_interval_us == 0 || self.timing.load_time_interval_us == 0 {
            return Err(ConfigError::Validation(
                "timing intervals must be non-zero".to_string(),
            ));
        }
        if self.timing.get_time_interval_us >= self.timing.load_time_interval_us {
            return Err(ConfigError::Validation(
                "get_time_interval_us must be smaller than load_time_interval_us".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> String {
        let mut joints = String::new();
        for i in 1..=DOF {
            joints.push_str(&format!(
                r#"
[[joints]]
node_id = {i}
control_speed = 50
backlash_control_speed = 10
[joints.scaling]
scale = 0.001533980787886
offset = 0.0
position_reference_offset = 0.0
u_scale = 1.0
"#
            ));
        }
        format!(
            r#"
cycle_time_ms = 12

[channel]
kind = "simulated"
{joints}
"#
        )
    }

    #[test]
    fn loads_valid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_toml().as_bytes()).unwrap();
        let config = RobotConfig::load(file.path()).unwrap();
        assert_eq!(config.joints.len(), DOF);
        assert_eq!(config.cycle_time_ms, 12);
    }

    #[test]
    fn rejects_wrong_joint_count() {
        let mut config: RobotConfig = toml::from_str(&sample_toml()).unwrap();
        config.joints.pop();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_node_ids() {
        let mut config: RobotConfig = toml::from_str(&sample_toml()).unwrap();
        config.joints[1].node_id = config.joints[0].node_id;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_low_baud() {
        let mut config: RobotConfig = toml::from_str(&sample_toml()).unwrap();
        config.channel = ChannelConfig::Serial {
            device: "/dev/ttyUSB0".to_string(),
            baud: 9600,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_timing() {
        let mut config: RobotConfig = toml::from_str(&sample_toml()).unwrap();
        config.timing.get_time_interval_us = config.timing.load_time_interval_us;
        assert!(config.validate().is_err());
    }
}
