#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas for the carport door controllers.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Door entries can also come from the legacy JSON storage file (an array
//!   of camelCase door records); field aliases let one schema read both.
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use eyre::WrapErr;
use serde::Deserialize;

/// Baud rates the rangefinder firmware accepts.
pub const SUPPORTED_BAUD_RATES: [u32; 11] = [
    9_600, 14_400, 19_200, 38_400, 56_000, 57_600, 115_200, 230_400, 256_000, 460_800, 921_600,
];

/// Highest push rate the rangefinder supports, in Hz.
pub const MAX_SAMPLE_RATE_HZ: u16 = 250;

/// Shortest quiet period the sensor needs after a soft reset (ms).
pub const MIN_RESET_SETTLE_MS: u64 = 5_000;

/// Shortest quiet period after each later bring-up command (ms).
pub const MIN_STEP_SETTLE_MS: u64 = 2_000;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MotionModelCfg {
    /// Initial slope ceiling (cm per sample); grows at runtime.
    #[serde(alias = "maxSlope")]
    pub max_slope: f64,
    /// Slopes at or below this magnitude are treated as sensor jitter.
    #[serde(alias = "jitterSlope")]
    pub jitter_slope: f64,
}

impl Default for MotionModelCfg {
    fn default() -> Self {
        Self {
            max_slope: 25.0,
            jitter_slope: 0.4,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TfLunaCfg {
    #[serde(alias = "serialPort")]
    pub serial_port: String,
    #[serde(default = "default_baud_rate", alias = "baudRate")]
    pub baud_rate: u32,
    /// Push rate used by start-measurement, in Hz.
    #[serde(default = "default_sample_rate", alias = "sampleRate")]
    pub sample_rate: u16,
    /// Distance (cm) reported with the door fully closed.
    #[serde(default, alias = "closedLimit")]
    pub closed_limit: u16,
    /// Distance (cm) reported with the door fully open.
    #[serde(default, alias = "openLimit")]
    pub open_limit: u16,
    /// Dump every frame the parser sees at trace level.
    #[serde(default, alias = "serialParseLog")]
    pub serial_parse_log: bool,
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_sample_rate() -> u16 {
    5
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DoorCfg {
    #[serde(alias = "actuatorPin")]
    pub actuator_pin: u8,
    #[serde(alias = "downStatePin")]
    pub down_state_pin: u8,
    #[serde(alias = "upStatePin")]
    pub up_state_pin: u8,
    #[serde(default = "default_pulse_ms", alias = "actuatorPulseDurationMs")]
    pub actuator_pulse_duration_ms: u64,
    #[serde(default = "default_door_check_delay", alias = "doorCheckDelaySec")]
    pub door_check_delay_sec: u64,
    #[serde(default, alias = "motionModelConfig")]
    pub motion_model: MotionModelCfg,
    #[serde(alias = "tfLunaConfig")]
    pub tf_luna: TfLunaCfg,
}

fn default_pulse_ms() -> u64 {
    500
}

fn default_door_check_delay() -> u64 {
    13
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SessionCfg {
    /// Max wait for a command reply (ms).
    pub command_timeout_ms: u64,
    /// Quiet period after a soft reset before the next command (ms).
    pub reset_settle_ms: u64,
    /// Quiet period after every other bring-up command (ms).
    pub step_settle_ms: u64,
    /// Serial read timeout; bounds reader-thread shutdown latency (ms).
    pub read_timeout_ms: u64,
    /// Cadence of the motion-change poll (ms).
    pub motion_poll_ms: u64,
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            command_timeout_ms: 2_000,
            reset_settle_ms: MIN_RESET_SETTLE_MS,
            step_settle_ms: MIN_STEP_SETTLE_MS,
            read_timeout_ms: 50,
            motion_poll_ms: 1_000,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub session: SessionCfg,
    /// Inline door table; index in this list is the door id.
    #[serde(default)]
    pub doors: Vec<DoorCfg>,
    /// Optional JSON door file, used when `doors` is empty.
    /// Relative paths resolve against the config file's directory.
    #[serde(default)]
    pub doors_file: Option<PathBuf>,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Parse the legacy JSON door array.
pub fn parse_doors_json(s: &str) -> eyre::Result<Vec<DoorCfg>> {
    let value: serde_json::Value = serde_json::from_str(s).wrap_err("door file is not JSON")?;
    if !value.is_array() {
        eyre::bail!("invalid garage door configuration: expected a JSON array of doors");
    }
    serde_json::from_value(value).wrap_err("invalid garage door configuration")
}

pub fn load_doors_json(path: &Path) -> eyre::Result<Vec<DoorCfg>> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read door file {}", path.display()))?;
    parse_doors_json(&text)
}

impl Config {
    /// Read a TOML config file and resolve `doors_file` if the inline table is empty.
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("read config {}", path.display()))?;
        let mut cfg = load_toml(&text).wrap_err("parse config TOML")?;
        if cfg.doors.is_empty()
            && let Some(file) = cfg.doors_file.clone()
        {
            let resolved = if file.is_relative() {
                path.parent().unwrap_or_else(|| Path::new(".")).join(file)
            } else {
                file
            };
            cfg.doors = load_doors_json(&resolved)?;
        }
        Ok(cfg)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        if self.doors.is_empty() {
            eyre::bail!("no garage doors configured");
        }

        // Session
        if self.session.command_timeout_ms == 0 {
            eyre::bail!("session.command_timeout_ms must be >= 1");
        }
        if self.session.read_timeout_ms == 0 {
            eyre::bail!("session.read_timeout_ms must be >= 1");
        }
        if self.session.motion_poll_ms == 0 {
            eyre::bail!("session.motion_poll_ms must be >= 1");
        }
        // The sensor ignores commands while it restarts.
        if self.session.reset_settle_ms < MIN_RESET_SETTLE_MS {
            eyre::bail!("session.reset_settle_ms must be >= {MIN_RESET_SETTLE_MS}");
        }
        if self.session.step_settle_ms < MIN_STEP_SETTLE_MS {
            eyre::bail!("session.step_settle_ms must be >= {MIN_STEP_SETTLE_MS}");
        }

        for (id, door) in self.doors.iter().enumerate() {
            door.validate()
                .wrap_err_with(|| format!("doors[{id}] is invalid"))?;
        }
        Ok(())
    }
}

impl DoorCfg {
    pub fn validate(&self) -> eyre::Result<()> {
        let pins: HashSet<u8> = [self.actuator_pin, self.down_state_pin, self.up_state_pin]
            .into_iter()
            .collect();
        if pins.len() != 3 {
            eyre::bail!("actuator, down-state and up-state pins must be distinct");
        }
        if self.actuator_pulse_duration_ms == 0 {
            eyre::bail!("actuator_pulse_duration_ms must be > 0");
        }
        if self.actuator_pulse_duration_ms > 10_000 {
            eyre::bail!("actuator_pulse_duration_ms is unreasonably large (>10s)");
        }

        // Motion model
        let mm = &self.motion_model;
        if !mm.jitter_slope.is_finite() || mm.jitter_slope < 0.0 {
            eyre::bail!("motion_model.jitter_slope must be >= 0.0");
        }
        if !mm.max_slope.is_finite() || mm.max_slope <= mm.jitter_slope {
            eyre::bail!("motion_model.max_slope must be greater than jitter_slope");
        }

        // Rangefinder
        let luna = &self.tf_luna;
        if luna.serial_port.trim().is_empty() {
            eyre::bail!("tf_luna.serial_port must not be empty");
        }
        if !SUPPORTED_BAUD_RATES.contains(&luna.baud_rate) {
            eyre::bail!("tf_luna.baud_rate {} is not supported", luna.baud_rate);
        }
        if luna.sample_rate > MAX_SAMPLE_RATE_HZ {
            eyre::bail!("tf_luna.sample_rate must be <= {MAX_SAMPLE_RATE_HZ}");
        }
        Ok(())
    }
}
