#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core garage-door logic (hardware-agnostic).
//!
//! All hardware interactions go through the `carport_traits` seams
//! (`GpioChip`, `SerialLink`, `Clock`).
//!
//! ## Architecture
//!
//! - **Protocol**: stream framer and command encoder for the rangefinder (`codec`)
//! - **Session**: reader thread plus one-outstanding-command correlation (`session`)
//! - **Motion**: windowed least-squares slope classifier (`motion`)
//! - **Door**: lines, bring-up sequence, actuation, limit switches (`controller`)
//! - **Registry**: all doors plus the request/response envelope (`registry`)

pub mod codec;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod motion;
pub mod registry;
pub mod session;
pub mod status;
pub mod util;

pub use codec::{Command, CommandId, DecodedResponse, Measurement, ProtocolCodec};
pub use config::{DoorSettings, MotionThresholds, RangefinderSettings, SessionTimings};
pub use controller::DoorController;
pub use error::{CarportError, ProtocolError};
pub use motion::{MotionClassifier, MotionSample, MotionState};
pub use registry::{
    ControlRequest, DoorAction, DoorControllerRegistry, DoorPlatform, ObserveRequest,
    ServiceRequest, ServiceResponse, StatusData,
};
pub use session::{RangefinderSession, SessionOptions};
pub use status::{DoorStatus, Lifecycle, ObserveTargets, RangefinderStatus};
