//! `From` implementations bridging `carport_config` types to `carport_core` types.

use std::time::Duration;

use crate::config::{DoorSettings, MotionThresholds, RangefinderSettings, SessionTimings};

impl From<&carport_config::MotionModelCfg> for MotionThresholds {
    fn from(c: &carport_config::MotionModelCfg) -> Self {
        Self {
            max_slope: c.max_slope,
            jitter_slope: c.jitter_slope,
        }
    }
}

impl From<&carport_config::TfLunaCfg> for RangefinderSettings {
    fn from(c: &carport_config::TfLunaCfg) -> Self {
        Self {
            serial_port: c.serial_port.clone(),
            baud_rate: c.baud_rate,
            sample_rate: c.sample_rate,
            closed_limit_cm: c.closed_limit,
            open_limit_cm: c.open_limit,
            frame_log: c.serial_parse_log,
        }
    }
}

impl From<&carport_config::DoorCfg> for DoorSettings {
    fn from(c: &carport_config::DoorCfg) -> Self {
        Self {
            actuator_pin: c.actuator_pin,
            down_switch_pin: c.down_state_pin,
            up_switch_pin: c.up_state_pin,
            pulse: Duration::from_millis(c.actuator_pulse_duration_ms),
            check_delay: Duration::from_secs(c.door_check_delay_sec),
            motion: MotionThresholds::from(&c.motion_model),
            rangefinder: RangefinderSettings::from(&c.tf_luna),
        }
    }
}

/// Serial read timeout is applied by the link, not the session.
impl From<&carport_config::SessionCfg> for SessionTimings {
    fn from(c: &carport_config::SessionCfg) -> Self {
        Self {
            command_timeout: Duration::from_millis(c.command_timeout_ms),
            reset_settle: Duration::from_millis(c.reset_settle_ms),
            step_settle: Duration::from_millis(c.step_settle_ms),
            motion_poll: Duration::from_millis(c.motion_poll_ms),
        }
    }
}
