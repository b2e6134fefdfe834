//! Provider seams between the door-control core and the host platform.
//!
//! The core never touches a serial port or a GPIO chip directly; it goes
//! through the traits below so the same logic runs against rppal/serialport
//! on a Raspberry Pi and against simulators everywhere else.
pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Error type used at every trait boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Logic level of a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl Level {
    #[inline]
    pub fn is_low(self) -> bool {
        matches!(self, Level::Low)
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Low => f.write_str("low"),
            Level::High => f.write_str("high"),
        }
    }
}

/// A line acquired in output mode.
pub trait OutputLine: Send {
    fn set_value(&mut self, level: Level) -> Result<(), BoxError>;
}

/// A line acquired in input mode.
pub trait InputLine: Send {
    fn get_value(&mut self) -> Result<Level, BoxError>;
}

/// Chip-scoped line acquisition.
///
/// A chip may be shared between door controllers for acquisition, but every
/// returned line handle is owned by exactly one controller.
pub trait GpioChip: Send + Sync {
    /// Process-wide check whether the GPIO subsystem can be used at all.
    fn available(&self) -> bool;
    fn request_output(&self, pin: u8) -> Result<Box<dyn OutputLine>, BoxError>;
    fn request_input(&self, pin: u8) -> Result<Box<dyn InputLine>, BoxError>;
}

/// Receive half of a byte duplex.
pub trait ByteSource: Send {
    /// Read whatever is available into `buf`.
    ///
    /// Returns `Ok(0)` when the transport's read timeout elapsed without data,
    /// so callers can poll a shutdown flag between reads.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BoxError>;
}

/// Transmit half of a byte duplex.
pub trait ByteSink: Send {
    fn write(&mut self, bytes: &[u8]) -> Result<(), BoxError>;
    /// Block until queued bytes have been drained to the wire.
    fn flush(&mut self) -> Result<(), BoxError>;
}

/// Opens 8N1 serial channels by device path.
pub trait SerialLink: Send + Sync {
    fn open(
        &self,
        path: &str,
        baud_rate: u32,
    ) -> Result<(Box<dyn ByteSource>, Box<dyn ByteSink>), BoxError>;
}
