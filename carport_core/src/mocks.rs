//! Test and helper mocks for carport_core

use carport_traits::{BoxError, ByteSink, ByteSource, GpioChip, InputLine, OutputLine, SerialLink};

/// A GPIO provider for hosts without a GPIO bank; every request fails.
pub struct NoGpio;

impl GpioChip for NoGpio {
    fn available(&self) -> bool {
        false
    }

    fn request_output(&self, pin: u8) -> Result<Box<dyn OutputLine>, BoxError> {
        Err(Box::new(std::io::Error::other(format!("no gpio for pin {pin}"))))
    }

    fn request_input(&self, pin: u8) -> Result<Box<dyn InputLine>, BoxError> {
        Err(Box::new(std::io::Error::other(format!("no gpio for pin {pin}"))))
    }
}

/// A serial provider whose every open fails, like a missing device node.
pub struct NoSerial;

impl SerialLink for NoSerial {
    fn open(
        &self,
        path: &str,
        _baud_rate: u32,
    ) -> Result<(Box<dyn ByteSource>, Box<dyn ByteSink>), BoxError> {
        Err(Box::new(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{path}: no such device"),
        )))
    }
}
