//! Door-level status types and the per-door rangefinder cache.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{DecodedResponse, Measurement};

/// Position derived from the two limit switches at the time of a `check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoorStatus {
    Unknown,
    Open,
    Closed,
}

impl fmt::Display for DoorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DoorStatus::Unknown => "unknown",
            DoorStatus::Open => "open",
            DoorStatus::Closed => "closed",
        })
    }
}

/// Operational lifecycle of a door controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Uninitialized,
    Initializing,
    Ready,
    /// A hardware step failed during `init`; the door keeps serving what it can.
    Degraded,
}

/// Which internal event categories are logged at info instead of debug.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ObserveTargets {
    #[serde(default)]
    pub measurements: bool,
    #[serde(default)]
    pub parser_command_response: bool,
}

/// Last values reported by the rangefinder.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangefinderStatus {
    pub restore_default_settings_status: Option<u8>,
    pub save_current_settings_status: Option<u8>,
    pub soft_reset_status: Option<u8>,
    pub baud_rate: u32,
    /// 0 until a set-sample-rate reply says otherwise.
    pub sample_rate: u16,
    pub version: Option<String>,
    pub measurement: Option<u16>,
    pub amplitude: Option<u16>,
    pub temperature: Option<String>,
}

impl RangefinderStatus {
    /// Fold a decoded reply or measurement into the cache.
    pub fn apply(&mut self, response: &DecodedResponse) {
        match response {
            DecodedResponse::RestoreDefaultSettings { status } => {
                self.restore_default_settings_status = Some(*status);
            }
            DecodedResponse::SaveCurrentSettings { status } => {
                self.save_current_settings_status = Some(*status);
            }
            DecodedResponse::SoftReset { status } => self.soft_reset_status = Some(*status),
            DecodedResponse::BaudRate { value } => self.baud_rate = *value,
            DecodedResponse::SampleRate { value } => self.sample_rate = *value,
            DecodedResponse::Version { value } => self.version = Some(value.clone()),
            DecodedResponse::Measurement(m) => self.record_measurement(m),
        }
    }

    pub fn record_measurement(&mut self, m: &Measurement) {
        self.measurement = Some(m.distance_cm);
        self.amplitude = Some(m.amplitude);
        self.temperature = Some(m.temperature_label());
    }
}
