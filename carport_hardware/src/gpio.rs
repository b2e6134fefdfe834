//! rppal-backed digital lines for the Raspberry Pi header.
use carport_traits::{BoxError, GpioChip, InputLine, Level, OutputLine};
use rppal::gpio::{Gpio, InputPin, OutputPin};
use tracing::{debug, trace};

use crate::error::HwError;

#[inline]
fn to_rppal(level: Level) -> rppal::gpio::Level {
    match level {
        Level::Low => rppal::gpio::Level::Low,
        Level::High => rppal::gpio::Level::High,
    }
}

#[inline]
fn from_rppal(level: rppal::gpio::Level) -> Level {
    match level {
        rppal::gpio::Level::Low => Level::Low,
        rppal::gpio::Level::High => Level::High,
    }
}

/// The SoC GPIO bank. `None` when `/dev/gpiomem` could not be opened.
pub struct RppalChip {
    gpio: Option<Gpio>,
}

impl RppalChip {
    pub fn new() -> Self {
        match Gpio::new() {
            Ok(gpio) => Self { gpio: Some(gpio) },
            Err(e) => {
                tracing::warn!(error = %e, "gpio subsystem unavailable");
                Self { gpio: None }
            }
        }
    }

    fn pin(&self, pin: u8) -> Result<rppal::gpio::Pin, HwError> {
        let gpio = self
            .gpio
            .as_ref()
            .ok_or_else(|| HwError::GpioUnavailable("gpio chip not opened".into()))?;
        gpio.get(pin).map_err(|e| HwError::Gpio {
            pin,
            reason: e.to_string(),
        })
    }
}

impl Default for RppalChip {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioChip for RppalChip {
    fn available(&self) -> bool {
        self.gpio.is_some()
    }

    fn request_output(&self, pin: u8) -> Result<Box<dyn OutputLine>, BoxError> {
        let mut out = self.pin(pin)?.into_output();
        // Relay idles de-energised.
        out.set_low();
        debug!(pin, "output line acquired");
        Ok(Box::new(RppalOutput { pin, out }))
    }

    fn request_input(&self, pin: u8) -> Result<Box<dyn InputLine>, BoxError> {
        let input = self.pin(pin)?.into_input();
        debug!(pin, "input line acquired");
        Ok(Box::new(RppalInput { pin, input }))
    }
}

struct RppalOutput {
    pin: u8,
    out: OutputPin,
}

impl OutputLine for RppalOutput {
    fn set_value(&mut self, level: Level) -> Result<(), BoxError> {
        trace!(pin = self.pin, %level, "set line");
        self.out.write(to_rppal(level));
        Ok(())
    }
}

struct RppalInput {
    pin: u8,
    input: InputPin,
}

impl InputLine for RppalInput {
    fn get_value(&mut self) -> Result<Level, BoxError> {
        let level = from_rppal(self.input.read());
        trace!(pin = self.pin, %level, "read line");
        Ok(level)
    }
}
