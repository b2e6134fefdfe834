//! Binary protocol of the TF-Luna rangefinder.
//!
//! Two frame shapes share one byte stream:
//!
//! - info frames `5A len id payload.. checksum`, replies to commands, where
//!   `len` counts every byte of the frame;
//! - measurement frames `59 59 dist_lo dist_hi amp_lo amp_hi temp_lo temp_hi
//!   checksum`, pushed unsolicited while sampling is enabled.
//!
//! Outbound commands are `5A len id payload.. 00`.
use std::fmt;

use tracing::trace;

use crate::error::ProtocolError;

pub const INFO_HEADER: u8 = 0x5A;
pub const MEASUREMENT_HEADER: u8 = 0x59;
pub const MEASUREMENT_FRAME_LEN: usize = 9;
/// Header, length, id and trailing byte.
pub const MIN_INFO_FRAME_LEN: usize = 4;

pub const RESTORE_DEFAULT_SETTINGS_ID: u8 = 0x10;
pub const SAVE_CURRENT_SETTINGS_ID: u8 = 0x11;
pub const SOFT_RESET_ID: u8 = 0x02;
pub const SET_BAUD_RATE_ID: u8 = 0x06;
pub const SET_SAMPLE_RATE_ID: u8 = 0x03;
/// Firmware 3.x answers version requests on 0x01; some older notes list 0x14.
pub const GET_VERSION_ID: u8 = 0x01;
/// Single-shot trigger; push frames carry no id and are tagged with this one.
pub const MEASUREMENT_ID: u8 = 0x04;

/// Amplitudes at or below this are too weak to trust the distance.
pub const MIN_AMPLITUDE: u16 = 100;
/// Saturated return (overexposure).
pub const SATURATED_AMPLITUDE: u16 = u16::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandId {
    RestoreDefaultSettings = RESTORE_DEFAULT_SETTINGS_ID,
    SaveCurrentSettings = SAVE_CURRENT_SETTINGS_ID,
    SoftReset = SOFT_RESET_ID,
    SetBaudRate = SET_BAUD_RATE_ID,
    SetSampleRate = SET_SAMPLE_RATE_ID,
    GetVersion = GET_VERSION_ID,
    Measurement = MEASUREMENT_ID,
}

impl CommandId {
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandId::RestoreDefaultSettings => "restore-default-settings",
            CommandId::SaveCurrentSettings => "save-current-settings",
            CommandId::SoftReset => "soft-reset",
            CommandId::SetBaudRate => "set-baud-rate",
            CommandId::SetSampleRate => "set-sample-rate",
            CommandId::GetVersion => "get-version",
            CommandId::Measurement => "measurement",
        };
        f.write_str(name)
    }
}

/// An outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    RestoreDefaultSettings,
    SaveCurrentSettings,
    SoftReset,
    SetBaudRate(u32),
    /// Push rate in Hz; 0 disables push frames.
    SetSampleRate(u16),
    GetVersion,
    TriggerMeasurement,
}

impl Command {
    pub fn id(&self) -> CommandId {
        match self {
            Command::RestoreDefaultSettings => CommandId::RestoreDefaultSettings,
            Command::SaveCurrentSettings => CommandId::SaveCurrentSettings,
            Command::SoftReset => CommandId::SoftReset,
            Command::SetBaudRate(_) => CommandId::SetBaudRate,
            Command::SetSampleRate(_) => CommandId::SetSampleRate,
            Command::GetVersion => CommandId::GetVersion,
            Command::TriggerMeasurement => CommandId::Measurement,
        }
    }

    /// Whether the device answers this command with an info frame.
    pub fn expects_reply(&self) -> bool {
        !matches!(self, Command::TriggerMeasurement)
    }

    /// Encode as `[0x5A, len, id, payload.., 0x00]`.
    pub fn encode(&self) -> Vec<u8> {
        let payload: Vec<u8> = match *self {
            Command::SetBaudRate(baud) => baud.to_le_bytes().to_vec(),
            Command::SetSampleRate(hz) => hz.to_le_bytes().to_vec(),
            _ => Vec::new(),
        };
        let len = payload.len() + MIN_INFO_FRAME_LEN;
        let mut frame = Vec::with_capacity(len);
        // Longest payload is 4 bytes, so the length always fits.
        frame.extend_from_slice(&[INFO_HEADER, len as u8, self.id().code()]);
        frame.extend_from_slice(&payload);
        frame.push(0x00);
        frame
    }
}

/// One pushed (or triggered) distance sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Monotonic counter assigned by the codec, starting at 0.
    pub sequence: u64,
    /// Zero when the amplitude marks the reading as unreliable.
    pub distance_cm: u16,
    pub amplitude: u16,
    /// `raw / 8 - 256`, in °C.
    pub temperature_c: f64,
}

impl Measurement {
    /// Temperature formatted the way the status report shows it.
    pub fn temperature_label(&self) -> String {
        format!("{}C", self.temperature_c)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedResponse {
    RestoreDefaultSettings { status: u8 },
    SaveCurrentSettings { status: u8 },
    SoftReset { status: u8 },
    BaudRate { value: u32 },
    SampleRate { value: u16 },
    Version { value: String },
    Measurement(Measurement),
}

impl DecodedResponse {
    pub fn command_id(&self) -> CommandId {
        match self {
            DecodedResponse::RestoreDefaultSettings { .. } => CommandId::RestoreDefaultSettings,
            DecodedResponse::SaveCurrentSettings { .. } => CommandId::SaveCurrentSettings,
            DecodedResponse::SoftReset { .. } => CommandId::SoftReset,
            DecodedResponse::BaudRate { .. } => CommandId::SetBaudRate,
            DecodedResponse::SampleRate { .. } => CommandId::SetSampleRate,
            DecodedResponse::Version { .. } => CommandId::GetVersion,
            DecodedResponse::Measurement(_) => CommandId::Measurement,
        }
    }
}

fn report_garbage(skipped: &mut usize, out: &mut Vec<Result<DecodedResponse, ProtocolError>>) {
    if *skipped > 0 {
        out.push(Err(ProtocolError::Garbage(*skipped)));
        *skipped = 0;
    }
}

/// Stream framer. Holds the unconsumed tail between `feed` calls.
#[derive(Debug, Default)]
pub struct ProtocolCodec {
    buf: Vec<u8>,
    /// Noise bytes dropped since the last header, not yet reported.
    skipped: usize,
    next_sequence: u64,
    frame_log: bool,
}

impl ProtocolCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dump every complete frame at trace level.
    pub fn with_frame_log(mut self, on: bool) -> Self {
        self.frame_log = on;
        self
    }

    /// Append `bytes` and decode every complete frame now available.
    ///
    /// A partial frame at the end stays buffered (see [`pending`](Self::pending))
    /// until a later call completes it. Noise is counted across calls and
    /// reported as one [`ProtocolError::Garbage`] when the next header shows
    /// up, so splitting the input at any point yields the same responses as
    /// feeding it in one go. Faults are returned in-line; the offending bytes
    /// are consumed and decoding continues.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<DecodedResponse, ProtocolError>> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        let mut pos = 0usize;

        while self.buf.len() - pos >= 2 {
            let rest = &self.buf[pos..];
            match (rest[0], rest[1]) {
                (INFO_HEADER, len) => {
                    let len = usize::from(len);
                    report_garbage(&mut self.skipped, &mut out);
                    if len < MIN_INFO_FRAME_LEN {
                        out.push(Err(ProtocolError::BadLength(rest[1])));
                        pos += 1;
                        continue;
                    }
                    if rest.len() < len {
                        break;
                    }
                    let frame = &rest[..len];
                    if self.frame_log {
                        trace!(frame = ?frame, "info frame");
                    }
                    out.push(decode_info(frame));
                    pos += len;
                }
                (MEASUREMENT_HEADER, MEASUREMENT_HEADER) => {
                    report_garbage(&mut self.skipped, &mut out);
                    if rest.len() < MEASUREMENT_FRAME_LEN {
                        break;
                    }
                    let frame = &rest[..MEASUREMENT_FRAME_LEN];
                    if self.frame_log {
                        trace!(frame = ?frame, "measurement frame");
                    }
                    let m = decode_measurement(frame, self.next_sequence);
                    self.next_sequence = self.next_sequence.wrapping_add(1);
                    out.push(Ok(DecodedResponse::Measurement(m)));
                    pos += MEASUREMENT_FRAME_LEN;
                }
                _ => {
                    self.skipped += 1;
                    pos += 1;
                }
            }
        }
        self.buf.drain(..pos);
        out
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// End of stream: drop the partial frame and any unreported noise,
    /// returning how many bytes went with them.
    pub fn finish(&mut self) -> usize {
        let n = self.buf.len() + self.skipped;
        self.buf.clear();
        self.skipped = 0;
        n
    }
}

fn need(command: CommandId, payload: &[u8], n: usize) -> Result<(), ProtocolError> {
    if payload.len() < n {
        return Err(ProtocolError::ShortPayload {
            command,
            got: payload.len(),
            need: n,
        });
    }
    Ok(())
}

fn decode_info(frame: &[u8]) -> Result<DecodedResponse, ProtocolError> {
    let code = frame[2];
    // Everything between the id and the checksum byte.
    let payload = &frame[3..frame.len() - 1];
    let decoded = match code {
        RESTORE_DEFAULT_SETTINGS_ID => {
            need(CommandId::RestoreDefaultSettings, payload, 1)?;
            DecodedResponse::RestoreDefaultSettings { status: payload[0] }
        }
        SAVE_CURRENT_SETTINGS_ID => {
            need(CommandId::SaveCurrentSettings, payload, 1)?;
            DecodedResponse::SaveCurrentSettings { status: payload[0] }
        }
        SOFT_RESET_ID => {
            need(CommandId::SoftReset, payload, 1)?;
            DecodedResponse::SoftReset { status: payload[0] }
        }
        SET_BAUD_RATE_ID => {
            need(CommandId::SetBaudRate, payload, 4)?;
            DecodedResponse::BaudRate {
                value: u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
            }
        }
        SET_SAMPLE_RATE_ID => {
            need(CommandId::SetSampleRate, payload, 2)?;
            DecodedResponse::SampleRate {
                value: u16::from_le_bytes([payload[0], payload[1]]),
            }
        }
        GET_VERSION_ID => {
            need(CommandId::GetVersion, payload, 3)?;
            DecodedResponse::Version {
                value: format!("{}.{}.{}", payload[0], payload[1], payload[2]),
            }
        }
        id => {
            return Err(ProtocolError::UnknownCommand {
                id,
                len: frame.len(),
            });
        }
    };
    Ok(decoded)
}

fn decode_measurement(frame: &[u8], sequence: u64) -> Measurement {
    let distance = u16::from_le_bytes([frame[2], frame[3]]);
    let amplitude = u16::from_le_bytes([frame[4], frame[5]]);
    let raw_temp = u16::from_le_bytes([frame[6], frame[7]]);
    let distance_cm = if amplitude <= MIN_AMPLITUDE || amplitude == SATURATED_AMPLITUDE {
        0
    } else {
        distance
    };
    Measurement {
        sequence,
        distance_cm,
        amplitude,
        temperature_c: f64::from(raw_temp) / 8.0 - 256.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_fixed_frames() {
        assert_eq!(Command::SoftReset.encode(), vec![0x5A, 0x04, 0x02, 0x00]);
        assert_eq!(Command::GetVersion.encode(), vec![0x5A, 0x04, 0x01, 0x00]);
        assert_eq!(
            Command::SetSampleRate(0).encode(),
            vec![0x5A, 0x06, 0x03, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            Command::SetBaudRate(115_200).encode(),
            vec![0x5A, 0x08, 0x06, 0x00, 0xC2, 0x01, 0x00, 0x00]
        );
    }

    #[test]
    fn single_byte_waits() {
        let mut codec = ProtocolCodec::new();
        assert!(codec.feed(&[0x5A]).is_empty());
        assert_eq!(codec.pending(), &[0x5A]);
    }

    #[test]
    fn unknown_id_is_consumed() {
        let mut codec = ProtocolCodec::new();
        let out = codec.feed(&[0x5A, 0x05, 0x7F, 0x01, 0x00, 0x5A, 0x05, 0x02, 0x00, 0x61]);
        assert_eq!(
            out,
            vec![
                Err(ProtocolError::UnknownCommand { id: 0x7F, len: 5 }),
                Ok(DecodedResponse::SoftReset { status: 0 }),
            ]
        );
        assert!(codec.pending().is_empty());
    }

    #[test]
    fn noise_before_header_is_skipped() {
        let mut codec = ProtocolCodec::new();
        let out = codec.feed(&[0x00, 0x13, 0x5A, 0x07, 0x01, 3, 1, 2, 0x6A]);
        assert_eq!(
            out,
            vec![
                Err(ProtocolError::Garbage(2)),
                Ok(DecodedResponse::Version {
                    value: "3.1.2".into()
                }),
            ]
        );
    }

    #[test]
    fn finish_discards_residue() {
        let mut codec = ProtocolCodec::new();
        assert!(codec.feed(&[0x59, 0x59, 0x10]).is_empty());
        assert_eq!(codec.finish(), 3);
        assert!(codec.pending().is_empty());
    }

    #[test]
    fn temperature_scaling() {
        let m = decode_measurement(&[0x59, 0x59, 0, 0, 0xE8, 0x03, 0x00, 0x08, 0], 7);
        // 2048 / 8 - 256
        assert_eq!(m.temperature_c, 0.0);
        assert_eq!(m.sequence, 7);
        assert_eq!(m.temperature_label(), "0C");
    }
}
