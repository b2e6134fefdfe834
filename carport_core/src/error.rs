use thiserror::Error;

use crate::codec::CommandId;

/// Recoverable framing/decoding faults. The codec drops the offending bytes
/// and keeps going; these are only ever logged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown command id 0x{id:02X} in {len}-byte info frame")]
    UnknownCommand { id: u8, len: usize },
    #[error("info frame declares length {0}, shorter than the 4-byte minimum")]
    BadLength(u8),
    #[error("{command} reply carries {got} payload byte(s), need {need}")]
    ShortPayload {
        command: CommandId,
        got: usize,
        need: usize,
    },
    #[error("skipped {0} byte(s) with no frame header")]
    Garbage(usize),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CarportError {
    #[error("serial {op} failed: {reason}")]
    Transport { op: &'static str, reason: String },
    #[error("no reply to {command} within {after_ms} ms")]
    Timeout { command: CommandId, after_ms: u64 },
    #[error("hardware unavailable: {0}")]
    HardwareUnavailable(String),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("door {door} has no rangefinder session")]
    NotReady { door: usize },
}

impl CarportError {
    /// Status code reported in the service response envelope.
    pub fn status_code(&self) -> u16 {
        match self {
            CarportError::Validation(_) => 400,
            _ => 500,
        }
    }
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
