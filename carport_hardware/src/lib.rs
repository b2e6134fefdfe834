//! Platform adapters for the door controllers.
//!
//! With the `hardware` feature this crate talks to the Raspberry Pi GPIO bank
//! through rppal and to the rangefinder through the serialport crate. The
//! simulators in [`sim`] are always built; the CLI falls back to them on
//! development machines and the test suites drive them directly.
pub mod error;
pub mod sim;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;
#[cfg(feature = "hardware")]
pub mod serial;

pub use error::HwError;
pub use sim::{SimulatedChip, SimulatedLuna, SimulatedSerial};

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use gpio::RppalChip;
#[cfg(feature = "hardware")]
pub use serial::SerialPortLink;
