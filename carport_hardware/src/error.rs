use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio subsystem unavailable: {0}")]
    GpioUnavailable(String),
    #[error("gpio error on pin {pin}: {reason}")]
    Gpio { pin: u8, reason: String },
    #[error("serial open failed for {path}: {reason}")]
    SerialOpen { path: String, reason: String },
    #[error("serial write failed: {0}")]
    Write(String),
    #[error("serial flush failed: {0}")]
    Flush(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
