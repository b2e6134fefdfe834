//! Runtime settings for one door controller.
//!
//! These are the plain structs the controller reads; they are separate from
//! the serde schema in `carport_config` (see `conversions`).
use std::time::Duration;

/// Slope band for the motion classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionThresholds {
    pub max_slope: f64,
    pub jitter_slope: f64,
}

impl Default for MotionThresholds {
    fn default() -> Self {
        Self {
            max_slope: 25.0,
            jitter_slope: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangefinderSettings {
    pub serial_port: String,
    pub baud_rate: u32,
    /// Push rate applied by `start_measurement`.
    pub sample_rate: u16,
    pub closed_limit_cm: u16,
    pub open_limit_cm: u16,
    pub frame_log: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoorSettings {
    pub actuator_pin: u8,
    pub down_switch_pin: u8,
    pub up_switch_pin: u8,
    pub pulse: Duration,
    pub check_delay: Duration,
    pub motion: MotionThresholds,
    pub rangefinder: RangefinderSettings,
}

/// Timing of the rangefinder session and the controller's background work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    pub command_timeout: Duration,
    pub reset_settle: Duration,
    pub step_settle: Duration,
    pub motion_poll: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_millis(2_000),
            reset_settle: Duration::from_millis(5_000),
            step_settle: Duration::from_millis(2_000),
            motion_poll: Duration::from_millis(1_000),
        }
    }
}
